//! AI Mock Server - CLI Entry Point

use ai_mock_server::config::DEFAULT_CONFIG_YAML;
use ai_mock_server::{MockServer, MockServerConfig};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "ai-mock-server",
    about = "Programmable mock server for AI provider APIs - stubbed, streamed and error responses",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mock-server.yaml")]
    config: PathBuf,

    /// Interface to bind (overrides the configuration)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for an ephemeral port (overrides the configuration)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print sample configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// On shutdown, exit with an error if a stub was never matched
    #[arg(long)]
    verify_on_exit: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        println!("{DEFAULT_CONFIG_YAML}");
        return Ok(());
    }

    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockServerConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no stubs)");
        MockServerConfig::default()
    };

    if args.validate {
        config.validate()?;
        println!(
            "Configuration is valid ({} stubs defined)",
            config.stubs.len()
        );
        return Ok(());
    }

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let mut server = MockServer::with_config(config)?;
    let addr = server.start().await?;
    info!(base_url = %format!("http://{addr}"), "Serving stubs, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!(
        requests = server.total_requests(),
        matched = server.total_matched(),
        unmatched = server.total_unmatched(),
        "Shutting down"
    );
    server.stop().await;

    if args.verify_on_exit {
        server.verify_no_unmatched_expectations()?;
        info!("All stubs were matched");
    }

    Ok(())
}
