//! Configuration loading helpers.

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

/// Errors returned by configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error while reading config files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parse error.
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// Invalid value for a key.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Raw value string.
        value: String,
    },
    /// Unknown configuration key.
    #[error("unknown config key: {0}")]
    UnknownKey(String),
}

/// Top-level configuration schema.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OxityperConfig {
    /// Statsd reporting configuration.
    pub statsd: Option<StatsdConfigSpec>,
    /// Typechecking configuration.
    pub typecheck: Option<TypecheckConfigSpec>,
}

impl OxityperConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load configuration from the `OXITYPER_CONFIG` env var (if set),
    /// then apply `OXITYPER__section__field` overrides.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let config_path = env::var("OXITYPER_CONFIG").ok();
        let mut config = match config_path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment overrides in-place.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        for (key, value) in env::vars() {
            if !key.starts_with("OXITYPER__") {
                continue;
            }
            let path = key["OXITYPER__".len()..].to_ascii_lowercase();
            let parts: Vec<&str> = path.split("__").collect();
            let value = value.trim().to_string();

            match parts.as_slice() {
                ["statsd", "enabled"] => {
                    self.statsd_mut().enabled = Some(parse_value(&key, &value)?);
                }
                ["statsd", "host"] => {
                    self.statsd_mut().host = Some(value.to_string());
                }
                ["statsd", "port"] => {
                    self.statsd_mut().port = Some(parse_value(&key, &value)?);
                }
                ["statsd", "prefix"] => {
                    self.statsd_mut().prefix = Some(value.to_string());
                }
                ["typecheck", "num_workers"] => {
                    self.typecheck_mut().num_workers = Some(parse_value(&key, &value)?);
                }
                ["typecheck", "cancelable"] => {
                    self.typecheck_mut().cancelable = Some(parse_value(&key, &value)?);
                }
                _ => return Err(ConfigError::UnknownKey(key)),
            }
        }

        Ok(())
    }

    /// Resolve the statsd target when reporting is enabled.
    pub fn to_statsd_config(&self) -> Option<StatsdConfig> {
        let statsd = self.statsd.as_ref()?;
        if statsd.enabled != Some(true) {
            return None;
        }
        Some(StatsdConfig {
            host: statsd.host.clone().unwrap_or_else(|| "127.0.0.1".to_string()),
            port: statsd.port.unwrap_or(8125),
            prefix: statsd.prefix.clone().unwrap_or_else(|| "oxityper".to_string()),
        })
    }

    /// Build a `TypecheckConfig` using defaults plus overrides.
    pub fn to_typecheck_config(&self) -> TypecheckConfig {
        let mut config = TypecheckConfig::default();
        if let Some(typecheck) = &self.typecheck {
            typecheck.apply_to(&mut config);
        }
        config
    }

    fn statsd_mut(&mut self) -> &mut StatsdConfigSpec {
        if self.statsd.is_none() {
            self.statsd = Some(StatsdConfigSpec::default());
        }
        self.statsd.as_mut().expect("statsd config")
    }

    fn typecheck_mut(&mut self) -> &mut TypecheckConfigSpec {
        if self.typecheck.is_none() {
            self.typecheck = Some(TypecheckConfigSpec::default());
        }
        self.typecheck.as_mut().expect("typecheck config")
    }
}

/// Statsd configuration overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsdConfigSpec {
    /// Whether to report counters to statsd.
    pub enabled: Option<bool>,
    /// Daemon host.
    pub host: Option<String>,
    /// Daemon port.
    pub port: Option<u16>,
    /// Prefix prepended to every metric.
    pub prefix: Option<String>,
}

/// Typechecking configuration overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TypecheckConfigSpec {
    /// Number of worker threads.
    pub num_workers: Option<usize>,
    /// Whether slow paths are cancelable (language-server mode).
    pub cancelable: Option<bool>,
}

impl TypecheckConfigSpec {
    fn apply_to(&self, config: &mut TypecheckConfig) {
        if let Some(value) = self.num_workers {
            config.num_workers = value.max(1);
        }
        if let Some(value) = self.cancelable {
            config.cancelable = value;
        }
    }
}

/// Resolved statsd target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsdConfig {
    /// Daemon host.
    pub host: String,
    /// Daemon port.
    pub port: u16,
    /// Prefix prepended to every metric.
    pub prefix: String,
}

/// Resolved typechecking configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypecheckConfig {
    /// Number of worker threads.
    pub num_workers: usize,
    /// Whether slow paths are cancelable (language-server mode).
    pub cancelable: bool,
}

impl Default for TypecheckConfig {
    fn default() -> Self {
        Self {
            num_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            cancelable: true,
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
