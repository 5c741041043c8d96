use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "aioli-cli")]
#[command(about = "Inspect a running aioli application through its admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:5000")]
    url: String,

    #[arg(short, long, env = "AIOLI_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Application status and degraded unit count
    Status,
    /// List attached units
    Units,
    /// Show one attached unit
    Unit {
        /// Unit name
        name: String,
    },
    /// List mounted routes
    Routes,
}

impl Commands {
    fn endpoint(&self) -> String {
        match self {
            Commands::Status => "/admin/status".to_string(),
            Commands::Units => "/admin/units".to_string(),
            Commands::Unit { name } => format!("/admin/units/{name}"),
            Commands::Routes => "/admin/routes".to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let url = format!("{}{}", cli.url.trim_end_matches('/'), cli.command.endpoint());
    let res = client.get(url).headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
