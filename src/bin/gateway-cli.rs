use clap::{Parser, Subcommand};
use std::path::PathBuf;

use identity_gateway::auth::key::token_expiry;
use identity_gateway::config::load_config;
use identity_gateway::http::{body_to_query, ClientFactory};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Diagnostics for the identity gateway", long_about = None)]
struct Cli {
    /// Configuration file used by the gateway.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    Config,
    /// Mint an identity token with the configured strategy
    Token {
        /// Audience; defaults to the target URL
        #[arg(short, long)]
        audience: Option<String>,
    },
    /// Show the query string a /forward body translates to
    Query {
        /// JSON body, e.g. '{"targetParams":{"a":"1"}}'
        body: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config => {
            let config = load_config(cli.config.as_deref())?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Token { audience } => {
            let config = load_config(cli.config.as_deref())?;
            let audience = audience.unwrap_or_else(|| config.upstream.target_url.clone());
            let factory = ClientFactory::new(config.upstream, config.auth)?;
            let provider = factory.token_provider().await?;

            let token = provider.mint(&audience).await?;
            if token.is_empty() {
                eprintln!("mint failed; fail_open policy produced an empty token");
                std::process::exit(1);
            }
            eprintln!(
                "strategy: {}, audience: {}, exp: {}",
                provider.strategy(),
                audience,
                token_expiry(token.secret()).unwrap_or(token.expires_at())
            );
            println!("{}", token.secret());
        }
        Commands::Query { body } => {
            println!("{}", body_to_query(body.as_bytes())?);
        }
    }

    Ok(())
}
