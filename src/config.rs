//! Monitor configuration.
//!
//! Loaded from a TOML file whose every field is optional, then adjusted by
//! `LPMON_*` environment variables (after `.env` has been read by the binary).
//! A missing file is not an error: the defaults describe the stock pool.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alert::thresholds::RiskThresholds;
use crate::model::{CHAIN, CORE_TOKEN, ETHERSCAN_PLACEHOLDER_KEY, LP_POOL_ADDRESS, TARGET_CONTRACT};
use crate::retry::RetryPolicy;
use crate::sources::{default_sources, duplicate_names, is_valid_address, SourceDef};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub jitter_step_ms: u64,
    pub request_timeout_secs: u64,
    /// Largest accepted relative change against the last known good value.
    pub max_relative_deviation: f64,
    /// Consecutive all-source failures that count as degraded health.
    pub failure_ceiling: u32,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 1_000,
            jitter_step_ms: 100,
            request_timeout_secs: 10,
            max_relative_deviation: 0.9,
            failure_ceiling: 5,
        }
    }
}

impl FetcherConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_backoff_ms),
            Duration::from_millis(self.jitter_step_ms),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub contract: String,
    pub chain: String,
    pub pool_address: String,
    pub core_token: String,
    pub etherscan_api_key: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            contract: TARGET_CONTRACT.to_string(),
            chain: CHAIN.to_string(),
            pool_address: LP_POOL_ADDRESS.to_string(),
            core_token: CORE_TOKEN.to_string(),
            etherscan_api_key: ETHERSCAN_PLACEHOLDER_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub poll_interval_secs: u64,
    pub manual_override: Option<f64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            manual_override: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub fetcher: FetcherConfig,
    pub thresholds: RiskThresholds,
    pub target: TargetConfig,
    pub monitor: SessionConfig,
    pub sources: Vec<SourceDef>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            fetcher: FetcherConfig::default(),
            thresholds: RiskThresholds::default(),
            target: TargetConfig::default(),
            monitor: SessionConfig::default(),
            sources: default_sources(),
        }
    }
}

impl MonitorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads `path`; a file that does not exist yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Applies `LPMON_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from any key lookup. Unset keys leave fields alone;
    /// unparseable values are an error naming the key.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("LPMON_ETHERSCAN_API_KEY") {
            self.target.etherscan_api_key = key;
        }
        if let Some(v) = parse_var(&lookup, "LPMON_MAX_ATTEMPTS")? {
            self.fetcher.max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "LPMON_BASE_BACKOFF_MS")? {
            self.fetcher.base_backoff_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "LPMON_REQUEST_TIMEOUT_SECS")? {
            self.fetcher.request_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "LPMON_POLL_INTERVAL_SECS")? {
            self.monitor.poll_interval_secs = v;
        }
        if let Some(raw) = lookup("LPMON_MANUAL_OVERRIDE") {
            let raw = raw.trim();
            self.monitor.manual_override = if raw.is_empty() || raw.eq_ignore_ascii_case("clear") {
                None
            } else {
                Some(raw.parse().map_err(|_| {
                    ConfigError::Invalid(format!("LPMON_MANUAL_OVERRIDE={} is not a number", raw))
                })?)
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetcher.max_attempts == 0 {
            return Err(ConfigError::Invalid("fetcher.max_attempts must be at least 1".into()));
        }
        if !(self.fetcher.max_relative_deviation > 0.0) {
            return Err(ConfigError::Invalid(
                "fetcher.max_relative_deviation must be positive".into(),
            ));
        }
        if self.fetcher.failure_ceiling == 0 {
            return Err(ConfigError::Invalid("fetcher.failure_ceiling must be at least 1".into()));
        }
        self.thresholds.validate().map_err(ConfigError::Invalid)?;
        if let Some(v) = self.monitor.manual_override {
            if !v.is_finite() || v < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "monitor.manual_override {} must be a finite, non-negative number",
                    v
                )));
            }
        }
        if self.monitor.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("monitor.poll_interval_secs must be at least 1".into()));
        }
        for (field, address) in [
            ("target.contract", &self.target.contract),
            ("target.pool_address", &self.target.pool_address),
            ("target.core_token", &self.target.core_token),
        ] {
            if !is_valid_address(address) {
                return Err(ConfigError::Invalid(format!(
                    "{} '{}' is not a 0x-prefixed 20-byte hex address",
                    field, address
                )));
            }
        }
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("at least one [[sources]] entry is required".into()));
        }
        // An RFC 6901 pointer is empty or starts with '/'; anything else can
        // never match and would burn the retry budget every cycle.
        if let Some(def) = self
            .sources
            .iter()
            .find(|d| !d.json_pointer.is_empty() && !d.json_pointer.starts_with('/'))
        {
            return Err(ConfigError::Invalid(format!(
                "source '{}': json_pointer '{}' must be empty or start with '/'",
                def.name, def.json_pointer
            )));
        }
        let dupes = duplicate_names(&self.sources);
        if !dupes.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "duplicate source names: {}",
                dupes.join(", ")
            )));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{}={} is not a valid value", key, raw))),
    }
}
