mod file_config;

pub use file_config::{BootstrapOwner, FileConfig};

use crate::dedup::DedupConfig;
use crate::import::ImportConfig;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that take part in config resolution. Mirrors the fields
/// a TOML config file can override.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub read_pool_size: usize,
    pub logging_level: RequestsLoggingLevel,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub read_pool_size: usize,
    pub logging_level: RequestsLoggingLevel,

    pub import: ImportConfig,
    pub dedup: DedupConfig,
    pub bootstrap_owners: Vec<BootstrapOwner>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and an optional TOML
    /// config. TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let read_pool_size = file.read_pool_size.unwrap_or(cli.read_pool_size).max(1);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        Ok(Self {
            db_dir,
            port,
            read_pool_size,
            logging_level,
            import: file.import.unwrap_or_default(),
            dedup: file.dedup.unwrap_or_default(),
            bootstrap_owners: file.owners.unwrap_or_default(),
        })
    }

    pub fn library_db_path(&self) -> PathBuf {
        self.db_dir.join("library.db")
    }

    pub fn owner_db_path(&self) -> PathBuf {
        self.db_dir.join("owner.db")
    }
}

fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
