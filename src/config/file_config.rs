use crate::dedup::DedupConfig;
use crate::import::ImportConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub read_pool_size: Option<usize>,
    pub logging_level: Option<String>,

    // Feature sections
    pub import: Option<ImportConfig>,
    pub dedup: Option<DedupConfig>,

    /// Accounts created at startup if they do not exist yet.
    pub owners: Option<Vec<BootstrapOwner>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BootstrapOwner {
    pub username: String,
    pub password: String,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
