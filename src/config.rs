use crate::db::Database;
use crate::embeddings::LITE_DIM;
use crate::error::{Result, StoreError};
use crate::hot::DEFAULT_TTL;
use crate::index::IndexKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the store directory
pub const STORE_DIR: &str = ".strata";

/// Config file inside the store directory
pub const CONFIG_FILE: &str = "_config.yaml";

/// Database file inside the store directory
pub const DB_FILE: &str = "store.db";

/// Embedding model information
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: &'static str,
    pub description: &'static str,
}

/// Supported embedding backends
pub static MODELS: &[ModelInfo] = &[
    ModelInfo {
        name: "lite",
        description: "N-gram hashing - zero dependencies, instant startup",
    },
    ModelInfo {
        name: "server",
        description: "External embedding daemon on a Unix socket",
    },
];

pub const DEFAULT_MODEL: &str = "lite";

/// Default list/probe counts when switching to the clustered index
const DEFAULT_LISTS: usize = 16;
const DEFAULT_PROBES: usize = 4;

/// Store construction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Embedding dimension, fixed for the lifetime of a store
    pub dimension: usize,
    /// Hot-tier lifetime in seconds
    pub hot_ttl_secs: u64,
    pub index: IndexKind,
    pub embedding_model: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dimension: LITE_DIM,
            hot_ttl_secs: DEFAULT_TTL.as_secs(),
            index: IndexKind::Flat,
            embedding_model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn hot_ttl(&self) -> Duration {
        Duration::from_secs(self.hot_ttl_secs)
    }

    /// Read a config file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Look up a key as a display string
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "dimension" => Some(self.dimension.to_string()),
            "hot_ttl_secs" => Some(self.hot_ttl_secs.to_string()),
            "index" => Some(self.index.label()),
            "embedding_model" | "model" => Some(self.embedding_model.clone()),
            _ => None,
        }
    }

    /// Set a key from a string value
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "dimension" => self.dimension = parse_positive(key, value)?,
            "hot_ttl_secs" => self.hot_ttl_secs = parse_positive(key, value)? as u64,
            "index" => {
                self.index = match value {
                    "flat" => IndexKind::Flat,
                    "clustered" => IndexKind::Clustered {
                        lists: DEFAULT_LISTS,
                        probes: DEFAULT_PROBES,
                    },
                    other => {
                        return Err(StoreError::InvalidConfig(format!(
                            "index must be 'flat' or 'clustered', got '{other}'"
                        )))
                    }
                }
            }
            "index.lists" | "index.probes" => {
                let n = parse_positive(key, value)?;
                let IndexKind::Clustered { lists, probes } = &mut self.index else {
                    return Err(StoreError::InvalidConfig(format!(
                        "{key} only applies to the clustered index"
                    )));
                };
                if key == "index.lists" {
                    *lists = n;
                } else {
                    *probes = n;
                }
            }
            "embedding_model" | "model" => {
                if !MODELS.iter().any(|m| m.name == value) {
                    return Err(StoreError::InvalidConfig(format!("unknown model: {value}")));
                }
                self.embedding_model = value.to_string();
            }
            other => return Err(StoreError::InvalidConfig(format!("unknown key: {other}"))),
        }
        Ok(())
    }
}

/// Set one key in the config of the store at `store_path` and save it.
///
/// The dimension is fixed once the cold tier holds rows: their embeddings
/// would no longer load.
pub fn set_store_config(store_path: &Path, key: &str, value: &str) -> Result<StoreConfig> {
    let config_path = store_path.join(CONFIG_FILE);
    let mut config = StoreConfig::load(&config_path)?;
    let dimension = config.dimension;
    config.set(key, value)?;

    let db_path = store_path.join(DB_FILE);
    if config.dimension != dimension && db_path.exists() {
        let stored = Database::open(&db_path)?.count_memories()?;
        if stored > 0 {
            return Err(StoreError::InvalidConfig(format!(
                "dimension is fixed at {dimension}: {stored} stored memories use it"
            )));
        }
    }

    config.save(&config_path)?;
    Ok(config)
}

fn parse_positive(key: &str, value: &str) -> Result<usize> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(StoreError::InvalidConfig(format!(
            "{key}: expected a positive integer, got '{value}'"
        ))),
    }
}

/// Find the store directory, searching upward from current directory
pub fn find_store_path() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let candidate = current.join(STORE_DIR);
        if candidate.is_dir() {
            return Some(candidate);
        }

        if !current.pop() {
            break;
        }
    }

    // Check STRATA_PATH environment variable
    if let Ok(path) = std::env::var("STRATA_PATH") {
        let path = PathBuf::from(path);
        if path.is_dir() {
            return Some(path);
        }
    }

    None
}
