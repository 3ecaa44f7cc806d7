//! Reaper configuration.
//!
//! Sources are layered: built-in defaults, then an optional TOML file, then
//! command-line flags. Each source produces a `ReaperConfigLayer` whose
//! `Some` fields override the previous one; `finalize` fills the gaps with
//! defaults and `validate` rejects what the engine cannot run with.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ReaperError;

pub const DEFAULT_THREADS: usize = 1;
pub const DEFAULT_CHUNK_SIZE: usize = 100;
pub const DEFAULT_SLEEP_SECS: u64 = 60;
pub const DEFAULT_DELAY_SECS: u64 = 600;
pub const DEFAULT_AUTO_EXCLUDE_THRESHOLD: u32 = 100;
pub const DEFAULT_AUTO_EXCLUDE_TIMEOUT_SECS: u64 = 600;

/// Upper bound for every seconds-valued option (about ten years).
const MAX_SECS: u64 = 315_360_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for ReaperError {
    fn from(err: ConfigError) -> Self {
        ReaperError::Configuration(err.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ReaperConfigLayer {
    pub threads: Option<usize>,
    pub chunk_size: Option<usize>,
    pub sleep_time: Option<u64>,
    pub run_once: Option<bool>,
    pub greedy: Option<bool>,
    pub include_rses: Option<String>,
    pub exclude_rses: Option<String>,
    pub rses: Option<Vec<String>>,
    pub vos: Option<Vec<String>>,
    pub delay_seconds: Option<u64>,
    pub scheme: Option<String>,
    pub auto_exclude_threshold: Option<u32>,
    pub auto_exclude_timeout: Option<u64>,
}

impl ReaperConfigLayer {
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&raw, path)
    }

    pub fn merge(&mut self, other: Self) {
        if other.threads.is_some() {
            self.threads = other.threads;
        }
        if other.chunk_size.is_some() {
            self.chunk_size = other.chunk_size;
        }
        if other.sleep_time.is_some() {
            self.sleep_time = other.sleep_time;
        }
        if other.run_once.is_some() {
            self.run_once = other.run_once;
        }
        if other.greedy.is_some() {
            self.greedy = other.greedy;
        }
        if other.include_rses.is_some() {
            self.include_rses = other.include_rses;
        }
        if other.exclude_rses.is_some() {
            self.exclude_rses = other.exclude_rses;
        }
        if other.rses.is_some() {
            self.rses = other.rses;
        }
        if other.vos.is_some() {
            self.vos = other.vos;
        }
        if other.delay_seconds.is_some() {
            self.delay_seconds = other.delay_seconds;
        }
        if other.scheme.is_some() {
            self.scheme = other.scheme;
        }
        if other.auto_exclude_threshold.is_some() {
            self.auto_exclude_threshold = other.auto_exclude_threshold;
        }
        if other.auto_exclude_timeout.is_some() {
            self.auto_exclude_timeout = other.auto_exclude_timeout;
        }
    }

    pub fn finalize(self) -> ReaperConfig {
        let defaults = ReaperConfig::default();
        ReaperConfig {
            threads: self.threads.unwrap_or(defaults.threads),
            chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            sleep_time: self.sleep_time.unwrap_or(defaults.sleep_time),
            run_once: self.run_once.unwrap_or(defaults.run_once),
            greedy: self.greedy.unwrap_or(defaults.greedy),
            include_rses: self.include_rses.filter(|s| !s.trim().is_empty()),
            exclude_rses: self.exclude_rses.filter(|s| !s.trim().is_empty()),
            rses: self.rses.unwrap_or_default(),
            vos: self.vos.unwrap_or_default(),
            delay_seconds: self.delay_seconds.unwrap_or(defaults.delay_seconds),
            scheme: self.scheme.filter(|s| !s.trim().is_empty()),
            auto_exclude_threshold: self
                .auto_exclude_threshold
                .unwrap_or(defaults.auto_exclude_threshold),
            auto_exclude_timeout: self
                .auto_exclude_timeout
                .unwrap_or(defaults.auto_exclude_timeout),
        }
    }
}

/// Fully resolved settings. Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReaperConfig {
    pub threads: usize,
    pub chunk_size: usize,
    pub sleep_time: u64,
    pub run_once: bool,
    /// Deprecated global switch; endpoints can be greedy on their own.
    pub greedy: bool,
    pub include_rses: Option<String>,
    pub exclude_rses: Option<String>,
    pub rses: Vec<String>,
    pub vos: Vec<String>,
    pub delay_seconds: u64,
    pub scheme: Option<String>,
    pub auto_exclude_threshold: u32,
    pub auto_exclude_timeout: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            sleep_time: DEFAULT_SLEEP_SECS,
            run_once: false,
            greedy: false,
            include_rses: None,
            exclude_rses: None,
            rses: Vec::new(),
            vos: Vec::new(),
            delay_seconds: DEFAULT_DELAY_SECS,
            scheme: None,
            auto_exclude_threshold: DEFAULT_AUTO_EXCLUDE_THRESHOLD,
            auto_exclude_timeout: DEFAULT_AUTO_EXCLUDE_TIMEOUT_SECS,
        }
    }
}

fn seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_SECS) as i64)
}

impl ReaperConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::Invalid("threads must be at least 1".into()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk-size must be at least 1".into()));
        }
        for (name, value) in [
            ("sleep-time", self.sleep_time),
            ("delay-seconds", self.delay_seconds),
            ("auto-exclude-timeout", self.auto_exclude_timeout),
        ] {
            if value > MAX_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be at most {MAX_SECS} seconds, got {value}"
                )));
            }
        }
        if let Some(scheme) = &self.scheme
            && !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(ConfigError::Invalid(format!("invalid scheme '{scheme}'")));
        }
        Ok(())
    }

    pub fn sleep_duration(&self) -> Duration {
        Duration::from_secs(self.sleep_time.min(MAX_SECS))
    }

    pub fn delay(&self) -> chrono::Duration {
        seconds(self.delay_seconds)
    }

    pub fn exclusion_timeout(&self) -> chrono::Duration {
        seconds(self.auto_exclude_timeout)
    }
}
