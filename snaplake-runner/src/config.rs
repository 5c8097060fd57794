//! Pipeline configuration loaded from TOML.
//!
//! ```toml
//! [archive]
//! backend = "fs"
//! root = "./archive"
//! namespace = "crypto"
//!
//! [run]
//! parallelism = 3
//! task_timeout_secs = 300
//! failure_policy = "lenient"
//!
//! [[tasks]]
//! name = "binance_ohlcv_btcusdt_1h"
//! source = "binance"
//! lookback_days = 30
//! request = { type = "klines", symbol = "BTCUSDT", interval = "1h", limit = 24 }
//! ```
//!
//! Every section is optional; a missing section takes its defaults, and so
//! does a missing key inside a section. With no `[[tasks]]` at all the four
//! standard crypto tasks are used.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use snaplake_core::archive::index::{DEFAULT_LOOKBACK_DAYS, DEFAULT_MAX_OBJECTS};
use snaplake_core::archive::LookbackWindow;
use snaplake_core::data::{binance, coingecko, ConnectorError, FetchRequest, HttpSettings};
use snaplake_core::partition::PartitionScheme;
use snaplake_core::{CoreError, StorageError};

use crate::summary::FailurePolicy;
use crate::task::TaskSpec;

pub const ENV_ARCHIVE_ROOT: &str = "SNAPLAKE_ARCHIVE_ROOT";
pub const ENV_COINGECKO_API_KEY: &str = "COINGECKO_API_KEY";
pub const ENV_BINANCE_API_KEY: &str = "BINANCE_API_KEY";

/// Sources a task may name.
pub const KNOWN_SOURCES: [&str; 2] = [coingecko::SOURCE, binance::SOURCE];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("connector setup failed: {0}")]
    Connector(#[from] ConnectorError),

    #[error("archive setup failed: {0}")]
    Storage(#[from] StorageError),
}

impl ConfigError {
    fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::Invalid(msg.into())
    }
}

// ── Sections ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Fs,
    /// In-process store; nothing survives the process. For dry runs.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub backend: StoreBackend,
    pub root: PathBuf,
    /// Leading key segment. Empty or absent in the file means none.
    pub namespace: Option<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Fs,
            root: PathBuf::from("./archive"),
            namespace: Some("crypto".into()),
        }
    }
}

impl ArchiveConfig {
    pub fn scheme(&self) -> Result<PartitionScheme, CoreError> {
        PartitionScheme::new(self.namespace.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub parallelism: usize,
    /// Per-task deadline. `0` disables it.
    pub task_timeout_secs: Option<u64>,
    pub failure_policy: FailurePolicy,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            parallelism: 3,
            task_timeout_secs: Some(300),
            failure_policy: FailurePolicy::Lenient,
        }
    }
}

impl RunSettings {
    pub fn task_timeout(&self) -> Option<std::time::Duration> {
        self.task_timeout_secs
            .filter(|&s| s > 0)
            .map(std::time::Duration::from_secs)
    }
}

/// `[coingecko]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinGeckoConfig {
    #[serde(default = "coingecko_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        Self {
            base_url: coingecko_base_url(),
            api_key: None,
        }
    }
}

/// `[binance]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinanceConfig {
    #[serde(default = "binance_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: binance_base_url(),
            api_key: None,
        }
    }
}

fn coingecko_base_url() -> String {
    coingecko::DEFAULT_BASE_URL.to_string()
}

fn binance_base_url() -> String {
    binance::DEFAULT_BASE_URL.to_string()
}

fn check_base_url(section: &str, url: &str) -> Result<(), ConfigError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ConfigError::invalid(format!("{section}.base_url must not be empty")));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::invalid(format!(
            "{section}.base_url must be an http(s) URL, got '{url}'"
        )));
    }
    Ok(())
}

fn default_lookback_days() -> u32 {
    DEFAULT_LOOKBACK_DAYS
}

fn default_max_objects() -> usize {
    DEFAULT_MAX_OBJECTS
}

/// One `[[tasks]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    pub source: String,
    pub request: FetchRequest,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default = "default_max_objects")]
    pub max_objects: usize,
}

impl TaskConfig {
    pub fn to_spec(&self) -> Result<TaskSpec, ConfigError> {
        let spec = TaskSpec {
            name: self.name.clone(),
            source: self.source.clone(),
            request: self.request.clone(),
            window: LookbackWindow::new(self.lookback_days, self.max_objects)?,
        };
        spec.validate()?;
        Ok(spec)
    }
}

// ── PipelineConfig ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub coingecko: CoinGeckoConfig,
    #[serde(default)]
    pub binance: BinanceConfig,
    #[serde(default = "default_tasks")]
    pub tasks: Vec<TaskConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            archive: ArchiveConfig::default(),
            run: RunSettings::default(),
            http: HttpSettings::default(),
            coingecko: CoinGeckoConfig::default(),
            binance: BinanceConfig::default(),
            tasks: default_tasks(),
        }
    }
}

/// Spot prices, the top-100 market overview, 24h tickers and hourly BTC candles.
pub fn default_tasks() -> Vec<TaskConfig> {
    let strings = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    vec![
        TaskConfig {
            name: "coingecko_spot_prices".into(),
            source: coingecko::SOURCE.into(),
            request: FetchRequest::SpotPrices {
                coin_ids: strings(&["bitcoin", "ethereum", "cardano", "solana", "binancecoin"]),
                vs_currencies: strings(&["usd", "eur", "btc"]),
            },
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            max_objects: DEFAULT_MAX_OBJECTS,
        },
        TaskConfig {
            name: "coingecko_market_data".into(),
            source: coingecko::SOURCE.into(),
            request: FetchRequest::Markets {
                vs_currency: "usd".into(),
                per_page: 100,
                page: 1,
            },
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            max_objects: DEFAULT_MAX_OBJECTS,
        },
        TaskConfig {
            name: "binance_tickers_24h".into(),
            source: binance::SOURCE.into(),
            request: FetchRequest::Tickers24h {
                symbols: strings(&["BTCUSDT", "ETHUSDT", "BNBUSDT", "SOLUSDT", "ADAUSDT"]),
            },
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            max_objects: DEFAULT_MAX_OBJECTS,
        },
        TaskConfig {
            name: "binance_ohlcv_btcusdt_1h".into(),
            source: binance::SOURCE.into(),
            request: FetchRequest::Klines {
                symbol: "BTCUSDT".into(),
                interval: "1h".into(),
                limit: 24,
            },
            lookback_days: 30,
            max_objects: DEFAULT_MAX_OBJECTS,
        },
    ]
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::invalid(e.to_string()))
    }

    /// Apply environment overrides. Variables that are unset or empty are ignored.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(root) = get(ENV_ARCHIVE_ROOT) {
            self.archive.root = PathBuf::from(root);
        }
        if let Some(key) = get(ENV_COINGECKO_API_KEY) {
            self.coingecko.api_key = Some(key);
        }
        if let Some(key) = get(ENV_BINANCE_API_KEY) {
            self.binance.api_key = Some(key);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.parallelism == 0 {
            return Err(ConfigError::invalid("run.parallelism must be at least 1"));
        }
        self.archive.scheme()?;
        self.http
            .validate()
            .map_err(|e| ConfigError::invalid(e.to_string()))?;
        check_base_url("coingecko", &self.coingecko.base_url)?;
        check_base_url("binance", &self.binance.base_url)?;
        if self.tasks.is_empty() {
            return Err(ConfigError::invalid("no tasks configured"));
        }

        let mut names = BTreeSet::new();
        for task in &self.tasks {
            if !names.insert(task.name.as_str()) {
                return Err(ConfigError::invalid(format!("duplicate task name '{}'", task.name)));
            }
            if !KNOWN_SOURCES.contains(&task.source.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "task '{}': unknown source '{}' (expected one of {})",
                    task.name,
                    task.source,
                    KNOWN_SOURCES.join(", ")
                )));
            }
            task.to_spec().map_err(|e| match e {
                ConfigError::Core(inner) => {
                    ConfigError::invalid(format!("task '{}': {inner}", task.name))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    pub fn task(&self, name: &str) -> Result<&TaskConfig, ConfigError> {
        self.tasks
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ConfigError::UnknownTask(name.to_string()))
    }

    /// Copy of this config with secrets blanked, for display.
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        for api_key in [&mut out.coingecko.api_key, &mut out.binance.api_key] {
            if api_key.is_some() {
                *api_key = Some("***".into());
            }
        }
        out
    }
}
