//! Monitor configuration
//!
//! Loaded once at startup from a JSON file (default
//! `/etc/chassismon/config.json`). The file form ([`ConfigFile`]) is validated
//! and compiled into [`MonitorConfig`]: the expected airflow is parsed and
//! every indicator rule pattern is compiled, so a bad rule fails the load
//! instead of the first indicator pass.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::conditions::Pattern;
use crate::constants::{paths, timing};
use crate::engine::IndicatorRule;
use crate::error::{ChassisError, Result};
use crate::facts::Airflow;

/// Configuration file as written on disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// "normal" or "reverse"; omitted disables the incorrect-airflow check
    #[serde(default)]
    pub expected_airflow: Option<String>,

    /// Indicator (LED) names, in the order writes are issued
    #[serde(default)]
    pub indicators: Vec<String>,

    #[serde(default)]
    pub indicator_rules: Vec<RuleEntry>,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_platform_socket")]
    pub platform_socket: PathBuf,

    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    #[serde(default = "default_led_base")]
    pub led_base: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RuleEntry {
    pub pattern: String,
    pub indicator: String,
}

fn default_retry_backoff_ms() -> u64 { timing::DEFAULT_RETRY_BACKOFF_MS }
fn default_platform_socket() -> PathBuf { PathBuf::from(paths::PLATFORM_SOCKET) }
fn default_socket_path() -> PathBuf { PathBuf::from(paths::DAEMON_SOCKET) }
fn default_led_base() -> PathBuf { PathBuf::from(paths::LED_BASE) }

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            expected_airflow: None,
            indicators: Vec::new(),
            indicator_rules: Vec::new(),
            retry_backoff_ms: default_retry_backoff_ms(),
            platform_socket: default_platform_socket(),
            socket_path: default_socket_path(),
            led_base: default_led_base(),
        }
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub expected_airflow: Option<Airflow>,
    pub indicators: Vec<String>,
    pub indicator_rules: Vec<IndicatorRule>,
    pub retry_backoff_ms: u64,
    pub platform_socket: PathBuf,
    pub socket_path: PathBuf,
    pub led_base: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            expected_airflow: None,
            indicators: Vec::new(),
            indicator_rules: Vec::new(),
            retry_backoff_ms: timing::DEFAULT_RETRY_BACKOFF_MS,
            platform_socket: default_platform_socket(),
            socket_path: default_socket_path(),
            led_base: default_led_base(),
        }
    }
}

impl TryFrom<ConfigFile> for MonitorConfig {
    type Error = ChassisError;

    fn try_from(file: ConfigFile) -> Result<Self> {
        let expected_airflow = match file.expected_airflow.as_deref() {
            None => None,
            Some(raw) => match Airflow::parse(raw) {
                Airflow::Unknown => {
                    return Err(ChassisError::invalid_config(
                        "expected_airflow",
                        format!("'{}' is not \"normal\" or \"reverse\"", raw),
                    ))
                }
                resolved => Some(resolved),
            },
        };

        let mut declared = HashSet::new();
        for name in &file.indicators {
            if name.trim().is_empty() {
                return Err(ChassisError::invalid_config("indicators", "indicator names must not be empty"));
            }
            if !declared.insert(name.as_str()) {
                return Err(ChassisError::invalid_config(
                    "indicators",
                    format!("indicator '{}' is declared twice", name),
                ));
            }
        }

        let mut indicator_rules = Vec::with_capacity(file.indicator_rules.len());
        for (i, rule) in file.indicator_rules.iter().enumerate() {
            if !declared.contains(rule.indicator.as_str()) {
                return Err(ChassisError::invalid_config(
                    format!("indicator_rules[{}]", i),
                    format!("indicator '{}' is not declared in indicators", rule.indicator),
                ));
            }
            let pattern = Pattern::new(&rule.pattern).map_err(|e| {
                ChassisError::invalid_config(format!("indicator_rules[{}]", i), e.to_string())
            })?;
            indicator_rules.push(IndicatorRule {
                pattern,
                indicator: rule.indicator.clone(),
            });
        }

        let retry_backoff_ms = file
            .retry_backoff_ms
            .clamp(timing::MIN_RETRY_BACKOFF_MS, timing::MAX_RETRY_BACKOFF_MS);
        if retry_backoff_ms != file.retry_backoff_ms {
            warn!(
                "retry_backoff_ms {} out of range, using {}",
                file.retry_backoff_ms, retry_backoff_ms
            );
        }

        Ok(Self {
            expected_airflow,
            indicators: file.indicators,
            indicator_rules,
            retry_backoff_ms,
            platform_socket: file.platform_socket,
            socket_path: file.socket_path,
            led_base: file.led_base,
        })
    }
}

/// Parse and validate configuration JSON
pub fn parse_config(content: &str) -> Result<MonitorConfig> {
    let file: ConfigFile = serde_json::from_str(content)
        .map_err(|e| ChassisError::invalid_config("config", format!("Failed to parse JSON: {}", e)))?;
    MonitorConfig::try_from(file)
}

/// Load and validate the configuration file at `path`
pub fn load_config(path: &Path) -> Result<MonitorConfig> {
    let content = fs::read_to_string(path).map_err(|source| ChassisError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&content)?;
    debug!(
        "Loaded config from {}: {} indicators, {} rules",
        path.display(),
        config.indicators.len(),
        config.indicator_rules.len()
    );
    Ok(config)
}
