use crate::error::{EngineError, EngineResult};
use anyhow::{anyhow, Result};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Loader capability for persisted strategy configs.
///
/// `load` prefers the active document and falls back to the default one;
/// `load_default` reads only the default document. `save` and `save_default`
/// write the respective document.
pub trait ConfigSource {
    fn load<T: DeserializeOwned>(&self) -> EngineResult<T>;
    fn load_default<T: DeserializeOwned>(&self) -> EngineResult<T>;
    fn save<T: Serialize>(&self, config: &T) -> EngineResult<()>;
    fn save_default<T: Serialize>(&self, config: &T) -> EngineResult<()>;
}

/// JSON documents on disk: an active `primary` file and a `fallback` default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConfigSource {
    primary: PathBuf,
    fallback: PathBuf,
}

impl FileConfigSource {
    pub fn new(primary: impl Into<PathBuf>, fallback: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            fallback: fallback.into(),
        }
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }

    pub fn fallback(&self) -> &Path {
        &self.fallback
    }

    fn parse<T: DeserializeOwned>(path: &Path, raw: &str) -> EngineResult<T> {
        serde_json::from_str(raw).map_err(|source| EngineError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write<T: Serialize>(path: &Path, config: &T) -> EngineResult<()> {
        let write_error = |reason: String| EngineError::ConfigWrite {
            path: path.to_path_buf(),
            reason,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| write_error(e.to_string()))?;
        }
        let body = serde_json::to_string_pretty(config).map_err(|e| write_error(e.to_string()))?;
        fs::write(path, body).map_err(|e| write_error(e.to_string()))
    }
}

impl ConfigSource for FileConfigSource {
    fn load<T: DeserializeOwned>(&self) -> EngineResult<T> {
        match fs::read_to_string(&self.primary) {
            Ok(raw) => {
                debug!("Loaded config from {}", self.primary.display());
                Self::parse(&self.primary, &raw)
            }
            Err(primary_error) => {
                warn!(
                    "Config {} unavailable ({}); using default {}",
                    self.primary.display(),
                    primary_error,
                    self.fallback.display()
                );
                let raw = fs::read_to_string(&self.fallback).map_err(|source| {
                    EngineError::ConfigRead {
                        primary: self.primary.clone(),
                        fallback: self.fallback.clone(),
                        source,
                    }
                })?;
                Self::parse(&self.fallback, &raw)
            }
        }
    }

    fn load_default<T: DeserializeOwned>(&self) -> EngineResult<T> {
        let raw = fs::read_to_string(&self.fallback).map_err(|source| EngineError::ConfigRead {
            primary: self.fallback.clone(),
            fallback: self.fallback.clone(),
            source,
        })?;
        Self::parse(&self.fallback, &raw)
    }

    fn save<T: Serialize>(&self, config: &T) -> EngineResult<()> {
        Self::write(&self.primary, config)
    }

    fn save_default<T: Serialize>(&self, config: &T) -> EngineResult<()> {
        Self::write(&self.fallback, config)
    }
}

/// Process-level knobs read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub optimizer_parallel: bool,
    pub optimizer_time_budget: Option<Duration>,
    pub backtest_close_all_at_end: bool,
    pub config_dir: PathBuf,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            optimizer_parallel: true,
            optimizer_time_budget: None,
            backtest_close_all_at_end: false,
            config_dir: PathBuf::from("config"),
        }
    }
}

impl RuntimeSettings {
    pub fn from_env() -> Result<Self> {
        let settings: HashMap<String, String> = std::env::vars().collect();
        Self::from_settings_map(&settings)
    }

    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();
        let optimizer_parallel = optional_setting_bool(settings, "OPTIMIZER_PARALLEL")?
            .unwrap_or(defaults.optimizer_parallel);
        let optimizer_time_budget =
            optional_setting_f64(settings, "OPTIMIZER_TIME_BUDGET_SECS", 0.0)?
                .map(|secs| budget_duration("OPTIMIZER_TIME_BUDGET_SECS", secs))
                .transpose()?;
        let backtest_close_all_at_end =
            optional_setting_bool(settings, "BACKTEST_CLOSE_ALL_AT_END")?
                .unwrap_or(defaults.backtest_close_all_at_end);
        let config_dir = optional_setting(settings, "SIGNAL_ENGINE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.config_dir);

        Ok(Self {
            optimizer_parallel,
            optimizer_time_budget,
            backtest_close_all_at_end,
            config_dir,
        })
    }
}

fn optional_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn optional_setting_bool(settings: &HashMap<String, String>, key: &str) -> Result<Option<bool>> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(anyhow!(
            "Setting {} must be a boolean (value: {})",
            key,
            raw
        )),
    }
}

/// Converts a positive number of seconds, rejecting values a `Duration` cannot hold.
pub fn budget_duration(key: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| anyhow!("Setting {} is out of range (value: {})", key, secs))
}

/// Parses a finite number strictly greater than `min_exclusive`.
fn optional_setting_f64(
    settings: &HashMap<String, String>,
    key: &str,
    min_exclusive: f64,
) -> Result<Option<f64>> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(None);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if value <= min_exclusive {
        return Err(anyhow!(
            "Setting {} must be > {} (value: {})",
            key,
            min_exclusive,
            raw
        ));
    }
    Ok(Some(value))
}
