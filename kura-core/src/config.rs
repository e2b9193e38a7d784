//! # Configuration Management
//!
//! Node configuration is loaded from a YAML file (path taken from
//! `CONFIG_PATH`, default `./config.yml`) and then overridden by environment
//! variables, so deployments can ship one file and specialize per host.
//!
//! Cluster topology lives in a separate YAML document enumerating shards as
//! `{id, address}` pairs; its path comes from `shard_config_path`.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// WAL file name within each shard's data directory.
    pub wal_path: String,
    /// Root data directory; shard `N` lives at `<data_dir>/shardN`.
    pub data_dir: PathBuf,
    /// Port for the RPC listener when no cluster address applies.
    pub rpc_port: u16,
    /// Base port for the metrics listener; shard `N` serves on
    /// `metrics_port + N`.
    pub metrics_port: u16,
    /// Number of shards in the cluster.
    pub shard_count: usize,
    /// Path to the cluster topology file.
    pub shard_config_path: PathBuf,
    pub engine: EngineTuning,
    pub cdc: CdcConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wal_path: "wal.log".to_string(),
            data_dir: PathBuf::from("./data"),
            rpc_port: 50051,
            metrics_port: 9091,
            shard_count: 1,
            shard_config_path: PathBuf::from("./cluster.yml"),
            engine: EngineTuning::default(),
            cdc: CdcConfig::default(),
        }
    }
}

/// Storage engine tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineTuning {
    /// Memtable size that triggers a flush to SSTable.
    pub memtable_flush_bytes: usize,
    /// Upper bound on a single serialized record.
    pub max_record_bytes: usize,
    /// Interval of the background WAL fsync task.
    pub wal_sync_interval_ms: u64,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            memtable_flush_bytes: 1024 * 1024,    // 1 MiB
            max_record_bytes: 4 * 1024 * 1024,    // 4 MiB
            wal_sync_interval_ms: 100,
        }
    }
}

/// Change-data-capture publisher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CdcConfig {
    pub enabled: bool,
    /// Bounded queue between the write path and the publisher worker;
    /// events are dropped when it is full.
    pub queue_capacity: usize,
}

impl Default for CdcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 1024,
        }
    }
}

impl Config {
    /// Load configuration from `CONFIG_PATH` (default `./config.yml`) and
    /// apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "./config.yml".to_string());
        Self::load_from(path)
    }

    /// Load configuration from an explicit path and apply environment
    /// overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "loading configuration");
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading config file {}", path.display()), e))?;

        let mut cfg: Config = serde_yaml::from_str(&data).map_err(|e| Error::Configuration {
            detail: format!("{}: {}", path.display(), e),
        })?;

        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Override YAML values with environment variables if they exist.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = env::var("WAL_PATH") {
            self.wal_path = v;
        }
        if let Ok(v) = env::var("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("SHARD_CONFIG_PATH") {
            self.shard_config_path = PathBuf::from(v);
        }
        if let Ok(v) = env::var("GRPC_PORT") {
            self.rpc_port = parse_env("GRPC_PORT", &v)?;
        }
        if let Ok(v) = env::var("METRICS_PORT") {
            self.metrics_port = parse_env("METRICS_PORT", &v)?;
        }
        if let Ok(v) = env::var("SHARD_COUNT") {
            self.shard_count = parse_env("SHARD_COUNT", &v)?;
        }
        Ok(())
    }

    /// Convert relative paths to absolute using the given root.
    pub fn resolve_paths(&mut self, root: impl AsRef<Path>) {
        let root = root.as_ref();
        if !self.data_dir.is_absolute() {
            self.data_dir = root.join(&self.data_dir);
        }
        if !self.shard_config_path.is_absolute() {
            self.shard_config_path = root.join(&self.shard_config_path);
        }
    }

    /// Data directory owned by a single shard.
    pub fn shard_dir(&self, shard_id: u32) -> PathBuf {
        self.data_dir.join(format!("shard{shard_id}"))
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| Error::Configuration {
        detail: format!("invalid value for {name}: {value:?}"),
    })
}

/// One shard in the cluster topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardDescriptor {
    pub id: u32,
    /// `host:port` the shard's RPC listener binds to.
    pub address: String,
}

/// Cluster topology: the full set of shards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub shards: Vec<ShardDescriptor>,
}

impl Cluster {
    /// Load shard metadata from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading cluster config {}", path.display()), e))?;

        let cluster: Cluster = serde_yaml::from_str(&data).map_err(|e| Error::Configuration {
            detail: format!("{}: {}", path.display(), e),
        })?;

        if cluster.shards.is_empty() {
            return Err(Error::Configuration {
                detail: format!("{}: cluster must contain at least one shard", path.display()),
            });
        }
        Ok(cluster)
    }

    /// Shard metadata for a given shard id.
    pub fn shard_by_id(&self, id: u32) -> Result<&ShardDescriptor> {
        self.shards
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::Configuration {
                detail: format!("shard {id} not found in cluster config"),
            })
    }
}
