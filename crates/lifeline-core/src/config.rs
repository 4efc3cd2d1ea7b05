//! lifeline.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LifelineConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub aggregation: AggregationConfig,
    pub attributes: AttributeLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/lifeline"),
        }
    }
}

impl StorageConfig {
    /// Path of the redb file inside the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("lifeline.redb")
    }
}

/// Schedule and window settings for the daily rollup.
///
/// Durations are strings such as `"90s"`, `"5m"`, `"24h"`, `"30d"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// UTC wall time of the daily run, `HH:MM`.
    pub run_at: String,
    pub online_window: String,
    pub active_window: String,
    pub run_timeout: String,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            run_at: "00:00".to_string(),
            online_window: "24h".to_string(),
            active_window: "30d".to_string(),
            run_timeout: "5m".to_string(),
        }
    }
}

impl AggregationConfig {
    pub fn run_at(&self) -> anyhow::Result<NaiveTime> {
        NaiveTime::parse_from_str(self.run_at.trim(), "%H:%M")
            .with_context(|| format!("invalid run_at {:?}, expected HH:MM", self.run_at))
    }

    pub fn online_window(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.online_window)
    }

    pub fn active_window(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.active_window)
    }

    pub fn run_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.run_timeout)
    }
}

/// Bounds on the free-form attributes a STARTED event may attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeLimits {
    pub max_keys: usize,
    pub max_key_len: usize,
    pub max_value_len: usize,
}

impl Default for AttributeLimits {
    fn default() -> Self {
        Self {
            max_keys: 32,
            max_key_len: 64,
            max_value_len: 1024,
        }
    }
}

impl LifelineConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: LifelineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse every duration and time field once so bad values fail at startup.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.aggregation.run_at()?;
        let online = self.aggregation.online_window()?;
        let active = self.aggregation.active_window()?;
        self.aggregation.run_timeout()?;
        if online.is_zero() || active.is_zero() {
            bail!("aggregation windows must be non-zero");
        }
        Ok(())
    }
}

/// Parse a duration string like `"30s"`, `"5m"`, `"24h"`, `"30d"`.
/// A bare number is seconds.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: u64 = digits
        .parse()
        .with_context(|| format!("invalid duration {s:?}"))?;
    let scale: u64 = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        other => bail!("invalid duration unit {other:?} in {s:?}"),
    };
    let secs = value
        .checked_mul(scale)
        .with_context(|| format!("duration {s:?} is out of range"))?;
    Ok(Duration::from_secs(secs))
}
