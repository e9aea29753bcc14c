//! CLI configuration loaded from `.schemadoc.yaml` and the environment.

use std::path::{Path, PathBuf};

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CONFIG_PATH_DEFAULT: &str = ".schemadoc.yaml";
pub const CONFIG_PATH_ENV: &str = "SCHEMADOC_CONFIG";

/// Log verbosity accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            "fatal" => Some(LogLevel::Fatal),
            _ => None,
        }
    }

    /// `fatal` has no separate filter and maps to `Error`.
    pub fn filter(&self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error | LogLevel::Fatal => LevelFilter::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub color: bool,
    pub debug: bool,
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            color: true,
            debug: false,
            log_level: LogLevel::Warn,
        }
    }
}

/// Where to read configuration from, and whether the file must exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPath {
    pub path: PathBuf,
    pub explicit: bool,
}

/// Pick the config path: `flag`, then `SCHEMADOC_CONFIG`, then the default name.
pub fn config_path(flag: Option<&Path>) -> ConfigPath {
    config_path_from(flag, |key| std::env::var(key).ok())
}

fn config_path_from(flag: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> ConfigPath {
    if let Some(path) = flag {
        return ConfigPath {
            path: path.to_path_buf(),
            explicit: true,
        };
    }
    match lookup(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        Some(path) => ConfigPath {
            path: PathBuf::from(path),
            explicit: true,
        },
        None => ConfigPath {
            path: PathBuf::from(CONFIG_PATH_DEFAULT),
            explicit: false,
        },
    }
}

impl Config {
    /// Parse a YAML document. An empty document yields the defaults.
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the file at `location`, then apply environment overrides.
    ///
    /// A missing file is only an error when the path was given explicitly.
    pub fn load(location: &ConfigPath) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(&location.path) {
            Ok(content) => Self::from_yaml(&content, &location.path)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !location.explicit => {
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: location.path.clone(),
                    source,
                })
            }
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `SCHEMADOC_COLOR`, `SCHEMADOC_DEBUG` and `SCHEMADOC_LOG_LEVEL`.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup("SCHEMADOC_COLOR") {
            self.color = parse_bool("SCHEMADOC_COLOR", &value)?;
        }
        if let Some(value) = lookup("SCHEMADOC_DEBUG") {
            self.debug = parse_bool("SCHEMADOC_DEBUG", &value)?;
        }
        if let Some(value) = lookup("SCHEMADOC_LOG_LEVEL") {
            self.log_level = LogLevel::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                key: "SCHEMADOC_LOG_LEVEL".to_string(),
                value: value.clone(),
            })?;
        }
        Ok(())
    }

    /// Effective level: `debug: true` wins over `log_level`.
    pub fn level_filter(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::Debug
        } else {
            self.log_level.filter()
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.color);
        assert!(!config.debug);
        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.level_filter(), LevelFilter::Warn);
    }

    #[test]
    fn parse_yaml() {
        let config = Config::from_yaml(
            "color: false\nlog_level: fatal\n",
            Path::new(".schemadoc.yaml"),
        )
        .unwrap();
        assert!(!config.color);
        assert_eq!(config.log_level, LogLevel::Fatal);
        assert_eq!(config.level_filter(), LevelFilter::Error);

        assert_eq!(
            Config::from_yaml("", Path::new("x.yaml")).unwrap(),
            Config::default()
        );
        assert!(matches!(
            Config::from_yaml("log_level: loud\n", Path::new("x.yaml")),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn debug_forces_debug_level() {
        let config = Config {
            debug: true,
            log_level: LogLevel::Error,
            ..Config::default()
        };
        assert_eq!(config.level_filter(), LevelFilter::Debug);
    }

    #[test]
    fn env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_from(env(&[
                ("SCHEMADOC_COLOR", "false"),
                ("SCHEMADOC_DEBUG", "1"),
                ("SCHEMADOC_LOG_LEVEL", "INFO"),
            ]))
            .unwrap();
        assert!(!config.color);
        assert!(config.debug);
        assert_eq!(config.log_level, LogLevel::Info);

        let err = config
            .apply_env_from(env(&[("SCHEMADOC_DEBUG", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn path_lookup_order() {
        let flag = Path::new("flag.yaml");
        let from_env = env(&[(CONFIG_PATH_ENV, "env.yaml")]);

        assert_eq!(
            config_path_from(Some(flag), &from_env),
            ConfigPath {
                path: PathBuf::from("flag.yaml"),
                explicit: true
            }
        );
        assert_eq!(config_path_from(None, &from_env).path, PathBuf::from("env.yaml"));

        let fallback = config_path_from(None, env(&[]));
        assert_eq!(fallback.path, PathBuf::from(CONFIG_PATH_DEFAULT));
        assert!(!fallback.explicit);
    }

    #[test]
    fn missing_file_handling() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");

        let implicit = ConfigPath {
            path: missing.clone(),
            explicit: false,
        };
        assert!(Config::load(&implicit).is_ok());

        let explicit = ConfigPath {
            path: missing,
            explicit: true,
        };
        let err = Config::load(&explicit).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert_eq!(err.exit_code(), 3);
    }
}
