//! Authenticated forwarding gateway.
//!
//! Relays every request to a single upstream target, attaching a Google
//! identity token when configured, and dispatches `/flow` bodies to a
//! Cloud Workflow.
//!
//! ```text
//!     Client ──▶ server ──▶ forwarding engine ──▶ client factory ──▶ Upstream
//!                  │                                   │
//!                  │                                   └── token provider
//!                  │                                       (ambient / self-signed, cached)
//!                  └── /flow ──▶ workflow trigger ──▶ Workflow Executions API
//! ```

use clap::Parser;
use std::path::PathBuf;

use identity_gateway::config::{load_config, loader::with_port};
use identity_gateway::{lifecycle, observability};

#[derive(Parser)]
#[command(name = "identity-gateway", version)]
#[command(
    about = "Forward requests to one upstream with Google identity tokens",
    long_about = None
)]
struct Args {
    /// Port to listen on; overrides `PORT` and the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Optional TOML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.listener.bind_address = with_port(&config.listener.bind_address, port);
    }

    observability::logging::init_logging(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "identity-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        target = %config.upstream.target_url,
        use_google_jwt = config.upstream.use_google_jwt,
        strategy = ?config.auth.strategy,
        workflow_id = ?config.workflow.workflow_id,
        "Configuration loaded"
    );

    lifecycle::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
