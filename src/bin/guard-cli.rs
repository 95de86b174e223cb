use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Inspect a running circuit-guard service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    /// Admin API key (only needed for admin commands)
    #[arg(short, long, env = "GUARD_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the aggregate health report
    Health,
    /// Show service status (admin)
    Status,
    /// List every breaker with its state and failure count (admin)
    Breakers,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if !cli.key.is_empty() {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
        );
    }

    let path = match cli.command {
        Commands::Health => "/api/health",
        Commands::Status => "/admin/status",
        Commands::Breakers => "/admin/breakers",
    };

    let res = client
        .get(format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    // The health endpoint answers 503 with a full report when storage is down.
    if status == StatusCode::SERVICE_UNAVAILABLE {
        if let Ok(json) = res.json::<Value>().await {
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        return Err(status_error(status).into());
    }
    if !status.is_success() {
        let text = res.text().await.unwrap_or_default();
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
        return Err(status_error(status).into());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn status_error(status: StatusCode) -> String {
    match status {
        StatusCode::UNAUTHORIZED => "service returned 401 Unauthorized (check --key)".to_string(),
        StatusCode::NOT_FOUND => "service returned 404 Not Found (admin routes disabled?)".to_string(),
        StatusCode::SERVICE_UNAVAILABLE => "service is unhealthy (503)".to_string(),
        other => format!("service returned status {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn respond_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/api/health")
    }

    #[tokio::test]
    async fn test_success_is_ok() {
        let url = respond_once("200 OK", r#"{"status":"healthy"}"#).await;
        let res = reqwest::Client::builder().no_proxy().build().unwrap().get(url).send().await.unwrap();
        assert!(print_response(res).await.is_ok());
    }

    #[tokio::test]
    async fn test_error_statuses_fail() {
        for (line, body) in [
            ("401 Unauthorized", ""),
            ("404 Not Found", ""),
            ("500 Internal Server Error", ""),
            ("503 Service Unavailable", r#"{"status":"unhealthy"}"#),
        ] {
            let url = respond_once(line, body).await;
            let res = reqwest::Client::builder().no_proxy().build().unwrap().get(url).send().await.unwrap();
            assert!(print_response(res).await.is_err(), "{line} must fail");
        }
    }

    #[test]
    fn test_status_messages() {
        assert!(status_error(StatusCode::UNAUTHORIZED).contains("401"));
        assert!(status_error(StatusCode::BAD_GATEWAY).contains("502"));
    }
}
