use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use setlist_server::config::{AppConfig, CliConfig, FileConfig};
use setlist_server::dedup::DuplicateReviewEngine;
use setlist_server::import::ImportPipeline;
use setlist_server::library_store::{LibraryStore, SqliteLibraryStore};
use setlist_server::owner::{OwnerManager, SqliteOwnerStore};
use setlist_server::server::{run_server, RequestsLoggingLevel};
use tokio_util::sync::CancellationToken;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the SQLite database files.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to a TOML config file. Values in it override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// Number of read-only SQLite connections for the library database.
    #[clap(long, default_value_t = 4)]
    pub read_pool_size: usize,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .init();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir,
        port: cli_args.port,
        read_pool_size: cli_args.read_pool_size,
        logging_level: cli_args.logging_level,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening song library at {:?}...", config.library_db_path());
    let library_store: Arc<dyn LibraryStore> = Arc::new(SqliteLibraryStore::new(
        config.library_db_path(),
        config.read_pool_size,
    )?);

    let owner_store = Arc::new(SqliteOwnerStore::new(config.owner_db_path())?);
    let owner_manager = Arc::new(OwnerManager::new(owner_store));

    for owner in &config.bootstrap_owners {
        match owner_manager.register(&owner.username, &owner.password) {
            Ok(id) => info!("Created owner {} (id {})", owner.username, id),
            // Usually already present from an earlier run
            Err(err) => info!("Owner {} not created: {}", owner.username, err),
        }
    }

    let import_pipeline = Arc::new(ImportPipeline::new(
        library_store.clone(),
        config.import.clone(),
    ));
    let dedup_engine = Arc::new(DuplicateReviewEngine::new(
        library_store.clone(),
        config.dedup.clone(),
    ));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!("Failed to listen for shutdown signal: {}", err),
        }
        signal_token.cancel();
    });

    info!("Ready to serve at port {}!", config.port);
    run_server(
        library_store,
        owner_manager,
        import_pipeline,
        dedup_engine,
        config.logging_level,
        config.port,
        shutdown,
    )
    .await
}
