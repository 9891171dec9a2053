//! roster-ingest: streaming CSV contact importer
//!
//! `serve` runs the HTTP service; `import <file>` runs one import against the
//! configured database and prints the report as JSON.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use roster_common::config::{load_toml_config, ConfigFileResolver};
use roster_common::events::EventBus;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use roster_ingest::config::ServiceConfig;
use roster_ingest::db::{self, SqliteRecordStore};
use roster_ingest::pipeline::ImportPipeline;
use roster_ingest::AppState;

/// Command-line arguments for roster-ingest
#[derive(Parser, Debug)]
#[command(name = "roster-ingest")]
#[command(about = "Streaming CSV contact importer")]
#[command(version)]
struct Args {
    /// Config file (overrides ROSTER_CONFIG and the default locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(short, long, global = true, env = "ROSTER_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Listen address
        #[arg(short, long, env = "ROSTER_BIND")]
        bind: Option<String>,
    },
    /// Import one CSV file ("-" reads stdin)
    Import {
        file: PathBuf,
        /// Field delimiter
        #[arg(long)]
        delimiter: Option<char>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config_path = ConfigFileResolver::new("roster-ingest")
        .with_cli_path(args.config.clone())
        .resolve();
    let mut config: ServiceConfig = load_toml_config(config_path.as_deref())
        .context("Failed to load configuration")?;
    if let Some(database) = args.database {
        config.database_path = Some(database);
    }

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "roster-ingest {} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    if let Some(path) = &config_path {
        info!("Config: {}", path.display());
    }

    match args.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            serve(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Import { file, delimiter } => {
            if let Some(delimiter) = delimiter {
                config.import.delimiter = delimiter;
            }
            import_file(config, file).await
        }
    }
}

async fn serve(config: ServiceConfig) -> Result<()> {
    config.import.validate().context("Invalid import configuration")?;

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    let event_bus = EventBus::new(256);
    let state = AppState::new(db_pool, config.import.clone(), event_bus);
    let app = roster_ingest::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("Listening on http://{}", config.bind_addr);
    info!("Health check: http://{}/health", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn import_file(config: ServiceConfig, file: PathBuf) -> Result<ExitCode> {
    let input: Box<dyn Read + Send> = if file.as_os_str() == "-" {
        Box::new(std::io::stdin())
    } else {
        Box::new(
            std::fs::File::open(&file)
                .with_context(|| format!("Failed to open {}", file.display()))?,
        )
    };

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    let sink = SqliteRecordStore::from_config(db_pool.clone(), &config.import);
    let report = ImportPipeline::new(sink, config.import).run(input).await;
    db_pool.close().await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
