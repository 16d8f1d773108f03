mod commands;

use std::net::IpAddr;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use commands::serve::ServeOverrides;

// ============================================================================
// CLI Types
// ============================================================================

/// Pagewire - serve page-oriented UI apps to remote clients
#[derive(Parser, Debug)]
#[command(version = pagewire::build_info::VERSION, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server with the built-in demo app
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = pagewire::config::DEFAULT_CONFIG_FILE)]
        config: String,

        /// Host to bind to (overrides config file)
        #[arg(long)]
        host: Option<IpAddr>,

        /// Port to listen on (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Seconds a session may sit idle before eviction (overrides config file)
        #[arg(long, value_name = "SECONDS")]
        eviction_timeout: Option<u64>,
    },
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            eviction_timeout,
        } => {
            let overrides = ServeOverrides {
                host,
                port,
                eviction_timeout_seconds: eviction_timeout,
            };
            commands::serve::run(&config, overrides).await
        }
    }
}

// ============================================================================
// Initialization
// ============================================================================

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
