use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use media_gateway::config::loader::load_config;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the media gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full dependency health report
    Health,
    /// Readiness probe
    Ready,
    /// Validate a config file without starting the gateway
    Check {
        /// Path to the TOML config file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            let json: Value = res.json().await?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        Commands::Ready => {
            let res = client.get(format!("{}/health/ready", cli.url)).send().await?;
            println!("{}: {}", res.status(), res.text().await?);
        }
        Commands::Check { path } => match load_config(&path) {
            Ok(config) => {
                println!(
                    "OK: {} route(s), listener {}",
                    config.routes.len(),
                    config.listener.bind_address
                );
            }
            Err(e) => {
                eprintln!("Invalid config: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
