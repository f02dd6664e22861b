//! Configuration file (`privmap.toml`).

use crate::collect::CollectOptions;
use crate::content_id::{Identifier, DEFAULT_HASH_KEY};
use crate::error::{PrivmapError, Result};
use crate::load::{LoadOptions, DEFAULT_BATCH_SIZE};
use crate::pipeline::ProcessOptions;
use crate::relate::{RelateOptions, DEFAULT_EDGE_CHUNK};
use crate::store::BoltConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILE: &str = "privmap.toml";

/// Every setting, each section defaulted.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Collection settings.
    #[serde(default)]
    pub collect: CollectConfig,

    /// Load and relationship settings.
    #[serde(default)]
    pub load: LoadConfig,

    /// Graph store connection.
    #[serde(default)]
    pub store: BoltConfig,

    /// Content addresser key.
    #[serde(default)]
    pub hash: HashConfig,
}

impl Config {
    /// Load configuration from a file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| PrivmapError::ConfigError(format!("failed to read config: {}", e)))?;
            toml::from_str(&content)
                .map_err(|e| PrivmapError::ConfigError(format!("failed to parse config: {}", e)))
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to a file as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PrivmapError::ConfigError(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content)
            .map_err(|e| PrivmapError::ConfigError(format!("failed to write config: {}", e)))?;
        Ok(())
    }

    /// Rejects values no run can work with.
    pub fn validate(&self) -> Result<()> {
        if self.collect.workers == 0 {
            return Err(PrivmapError::ConfigError("collect.workers must be at least 1".into()));
        }
        if self.load.batch_size == 0 {
            return Err(PrivmapError::ConfigError("load.batch_size must be at least 1".into()));
        }
        if self.load.edge_chunk_size == 0 {
            return Err(PrivmapError::ConfigError("load.edge_chunk_size must be at least 1".into()));
        }
        if self.load.max_in_flight == 0 {
            return Err(PrivmapError::ConfigError("load.max_in_flight must be at least 1".into()));
        }
        if !matches!(self.store.scheme.as_str(), "bolt" | "bolt+s" | "neo4j" | "neo4j+s") {
            return Err(PrivmapError::ConfigError(format!(
                "store.scheme '{}' is not one of bolt, bolt+s, neo4j, neo4j+s",
                self.store.scheme
            )));
        }
        self.identifier().map(|_| ())
    }

    /// Content addresser for the configured key.
    pub fn identifier(&self) -> Result<Identifier> {
        Identifier::from_hex_key(&self.hash.key)
    }

    /// Collector options from `[collect]`.
    pub fn collect_options(&self) -> CollectOptions {
        CollectOptions {
            roots: self.collect.roots.clone(),
            workers: self.collect.workers,
            exe_extensions: self.collect.exe_extensions.clone(),
            dll_extensions: self.collect.dll_extensions.clone(),
            follow_links: self.collect.follow_links,
        }
    }

    /// Process options from `[load]`.
    pub fn process_options(&self, drop_existing: bool) -> ProcessOptions {
        ProcessOptions {
            drop_existing,
            load: LoadOptions {
                batch_size: self.load.batch_size,
                max_in_flight: self.load.max_in_flight,
            },
            relate: RelateOptions {
                chunk: self.load.edge_chunk_size,
            },
        }
    }
}

/// `[collect]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CollectConfig {
    /// Directories to walk.
    pub roots: Vec<PathBuf>,
    /// Collector pool size (default: 8).
    pub workers: usize,
    /// Extensions staged as executables (default: `exe`).
    pub exe_extensions: Vec<String>,
    /// Extensions staged as libraries (default: `dll`).
    pub dll_extensions: Vec<String>,
    /// Follow symbolic links while walking (default: false).
    pub follow_links: bool,
    /// JSON inventory of tasks, services, groups, and processes.
    pub inventory: Option<PathBuf>,
}

impl Default for CollectConfig {
    fn default() -> Self {
        let options = CollectOptions::default();
        Self {
            roots: options.roots,
            workers: options.workers,
            exe_extensions: options.exe_extensions,
            dll_extensions: options.dll_extensions,
            follow_links: options.follow_links,
            inventory: None,
        }
    }
}

/// `[load]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoadConfig {
    /// Rows per node-creation transaction (default: 2000).
    pub batch_size: usize,
    /// Server-side chunk for joins and pair links (default: 10000).
    pub edge_chunk_size: usize,
    /// Node kinds loading concurrently (default: 2).
    pub max_in_flight: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            edge_chunk_size: DEFAULT_EDGE_CHUNK,
            max_in_flight: LoadOptions::default().max_in_flight,
        }
    }
}

/// `[hash]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HashConfig {
    /// 64 hex characters shared by every host of a deployment.
    pub key: String,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_HASH_KEY.to_string(),
        }
    }
}
