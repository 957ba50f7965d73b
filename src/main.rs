//! Pageview Analytics CLI
//!
//! Windowed page-view counting with a live SSE feed.

use clap::{Parser, Subcommand};
use pageview_analytics::{config::Config, server, VERSION};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pageview-analytics")]
#[command(version = VERSION)]
#[command(about = "Windowed page-view counting with a live SSE feed", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analytics server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,

        /// Aggregation window width in seconds (overrides config)
        #[arg(long)]
        window_secs: Option<u64>,

        /// Trailing range published on each tick, in seconds (overrides config)
        #[arg(long)]
        trailing_secs: Option<u64>,

        /// Seconds between publisher ticks (overrides config)
        #[arg(long)]
        tick_secs: Option<u64>,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            window_secs,
            trailing_secs,
            tick_secs,
        } => {
            let mut config = Config::load()?;
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(secs) = window_secs {
                config.window_duration = Duration::from_secs(secs);
            }
            if let Some(secs) = trailing_secs {
                config.trailing_window_secs = secs;
            }
            if let Some(secs) = tick_secs {
                config.tick_interval = Duration::from_secs(secs);
            }

            let (addr, shutdown_tx) = server::run(config).await?;
            tracing::info!("serving analytics on http://{addr} (ctrl-c to stop)");

            tokio::signal::ctrl_c().await?;
            let _ = shutdown_tx.send(());
            Ok(())
        }
        Commands::Config => {
            let config = Config::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!("# config file: {}", Config::config_path().display());
            Ok(())
        }
    }
}
