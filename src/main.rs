use anyhow::{Context, Result};
use axum::Router;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use innocore::agents::AgentController;
use innocore::api::{self, AppState};
use innocore::health::HealthAggregator;
use innocore::lifecycle::{Lifecycle, LifecycleSettings};
use innocore::subsystems::{Database, VectorStore};
use innocore::Config;

#[derive(Parser)]
#[command(name = "innocore")]
#[command(about = "InnoCore research service runtime", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the subsystems and serve the HTTP API
    Serve {
        #[arg(long, env = "INNOCORE_CONFIG", help = "Path to a TOML config file")]
        config: Option<PathBuf>,

        #[arg(long, help = "Bind address (overrides config)")]
        host: Option<String>,

        #[arg(long, help = "Port (overrides config)")]
        port: Option<u16>,

        #[arg(long, default_value = "info", help = "Log filter when RUST_LOG is unset")]
        log_level: String,
    },
    /// Validate the configuration and print it as TOML
    CheckConfig {
        #[arg(long, env = "INNOCORE_CONFIG", help = "Path to a TOML config file")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            log_level,
        } => {
            init_logging(&log_level)?;
            let mut config = Config::load(config.as_deref())?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            run_service(config).await?
        }
        Commands::CheckConfig { config } => {
            let config = Config::load(config.as_deref())?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}

async fn run_service(config: Config) -> Result<()> {
    let config = Arc::new(config);
    info!(host = %config.host, port = config.port, debug = config.debug, "Starting InnoCore");

    let database = Arc::new(Database::new(config.database_url.clone()));
    let vector_store = Arc::new(VectorStore::new(
        config.vector_database_url.clone(),
        config.vector_dimension,
    ));
    let agents = Arc::new(AgentController::new(config.max_concurrent_tasks));

    let lifecycle = Arc::new(Lifecycle::new(
        LifecycleSettings::from(&config.timeouts),
        database,
        vector_store,
        agents,
    ));

    let signals = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            lifecycle.request_shutdown();
        })
    };

    let startup = lifecycle.start().await?;
    for (kind, state) in &startup.subsystems {
        info!(subsystem = %kind, state = state.as_str(), "Subsystem state");
    }

    let served = if startup.interrupted {
        Ok(())
    } else {
        let state = AppState {
            health: Arc::new(HealthAggregator::new(
                lifecycle.agent_pool(),
                config.timeouts.health_query(),
            )),
            config: config.clone(),
        };
        api::serve(state, Router::new(), lifecycle.shutdown_token()).await
    };
    if let Err(e) = &served {
        error!(error = %format!("{:#}", e), "API server failed");
    }

    let shutdown = lifecycle.stop().await;
    signals.abort();

    if shutdown.deadline_exceeded {
        warn!("Shutdown finished past its deadline");
    }
    for (kind, reason) in &shutdown.failures {
        warn!(subsystem = %kind, error = %reason, "Subsystem did not close cleanly");
    }
    info!("InnoCore stopped");

    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
