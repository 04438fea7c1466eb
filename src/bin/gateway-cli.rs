use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the service gateway admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081", env = "GATEWAY_ADMIN_URL")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status and route table generation
    Status,
    /// Route, breaker and backend counters
    Stats,
    /// Per-service backend health and breaker state
    Health,
    /// Recent health check records
    Log {
        /// Only records for this service
        #[arg(short, long)]
        service: Option<String>,
        /// Maximum number of records
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Reload routes from the gateway's config file
    Reload,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match &cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Stats => client.get(format!("{base}/admin/stats")),
        Commands::Health => client.get(format!("{base}/admin/health")),
        Commands::Log { service, limit } => {
            let mut query = vec![("limit", limit.to_string())];
            if let Some(service) = service {
                query.push(("service", service.clone()));
            }
            client.get(format!("{base}/admin/health/log")).query(&query)
        }
        Commands::Reload => client.post(format!("{base}/admin/reload")),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
