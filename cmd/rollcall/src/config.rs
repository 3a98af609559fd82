//! Configuration file for the rollcall CLI.
//!
//! Stored as YAML in ~/.rollcall/config.yaml unless `--config` points
//! elsewhere. Every field is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use rollcall_attendance::{DEFAULT_THRESHOLD, HttpFaceModelConfig, PipelineConfig};
use rollcall_dispatch::{DispatchConfig, MqttConfig};

/// Default base configuration directory name.
pub const DEFAULT_BASE_DIR: &str = ".rollcall";
/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// redb database holding rosters and attendance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,

    /// Directory shared by dispatchers and workers for submitted images.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_dir: Option<PathBuf>,

    pub threshold: f32,

    /// Reuse roster indexes for this many seconds. 0 disables the cache.
    pub index_cache_ttl_secs: u64,

    pub await_timeout_secs: u64,

    pub model: ModelConfig,

    pub broker: BrokerConfig,
}

/// Face detection service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    pub dimension: usize,
    pub timeout_secs: u64,
    pub min_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub job_topic: String,
    pub result_topic: String,
    pub worker_group: String,
    pub max_in_flight: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            blob_dir: None,
            threshold: DEFAULT_THRESHOLD,
            index_cache_ttl_secs: 0,
            await_timeout_secs: 30,
            model: ModelConfig::default(),
            broker: BrokerConfig::default(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        let d = DispatchConfig::default();
        Self {
            url: "mqtt://127.0.0.1:1883".to_string(),
            client_id: None,
            job_topic: d.job_topic,
            result_topic: d.result_topic,
            worker_group: d.worker_group,
            max_in_flight: d.max_in_flight,
        }
    }
}

/// Gets the default config directory.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_BASE_DIR))
}

impl Config {
    /// Load from `custom_path`, or the default location. A missing file
    /// yields the defaults.
    pub fn load(custom_path: Option<&str>) -> anyhow::Result<Config> {
        let path = match custom_path {
            Some(p) => PathBuf::from(p),
            None => default_config_dir()
                .map(|d| d.join(DEFAULT_CONFIG_FILE))
                .ok_or_else(|| anyhow::anyhow!("cannot determine config path"))?,
        };
        let cfg = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("read {}", path.display()))?;
            Self::parse(&content).with_context(|| format!("parse {}", path.display()))?
        } else {
            if custom_path.is_some() {
                anyhow::bail!("config file {} not found", path.display());
            }
            Config::default()
        };
        Ok(cfg)
    }

    pub fn parse(yaml: &str) -> anyhow::Result<Config> {
        // An empty document is null in YAML.
        if yaml.trim().is_empty() {
            return Ok(Config::default());
        }
        let cfg: Config = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            anyhow::bail!("threshold must be finite and >= 0, got {}", self.threshold);
        }
        if self.await_timeout_secs == 0 {
            anyhow::bail!("await_timeout_secs must be positive");
        }
        Ok(())
    }

    fn data_path(&self, configured: &Option<PathBuf>, name: &str) -> anyhow::Result<PathBuf> {
        match configured {
            Some(p) => Ok(p.clone()),
            None => default_config_dir()
                .map(|d| d.join(name))
                .ok_or_else(|| anyhow::anyhow!("cannot determine home directory for {name}")),
        }
    }

    pub fn db_path(&self) -> anyhow::Result<PathBuf> {
        self.data_path(&self.db_path, "rollcall.redb")
    }

    pub fn blob_dir(&self) -> anyhow::Result<PathBuf> {
        self.data_path(&self.blob_dir, "blobs")
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_threshold(self.threshold)
            .with_index_cache_ttl(Duration::from_secs(self.index_cache_ttl_secs))
    }

    pub fn face_model(&self) -> anyhow::Result<HttpFaceModelConfig> {
        if self.model.base_url.is_empty() {
            anyhow::bail!("model.base_url is not configured");
        }
        let mut cfg = HttpFaceModelConfig::new(&self.model.base_url)
            .with_api_key(&self.model.api_key)
            .with_dimension(self.model.dimension)
            .with_min_score(self.model.min_score);
        if self.model.timeout_secs > 0 {
            cfg = cfg.with_timeout(Duration::from_secs(self.model.timeout_secs));
        }
        Ok(cfg)
    }

    pub fn dispatch(&self) -> DispatchConfig {
        DispatchConfig::default()
            .with_topics(&self.broker.job_topic, &self.broker.result_topic)
            .with_worker_group(&self.broker.worker_group)
            .with_await_timeout(Duration::from_secs(self.await_timeout_secs))
            .with_max_in_flight(self.broker.max_in_flight)
    }

    pub fn mqtt(&self) -> MqttConfig {
        let cfg = MqttConfig::new(&self.broker.url);
        match &self.broker.client_id {
            Some(id) => cfg.with_client_id(id),
            None => cfg,
        }
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
    }
    Ok(())
}
