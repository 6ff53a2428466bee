use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Expose real error text in 500 responses.
    pub debug: bool,
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub vector_database_url: Option<String>,
    pub vector_dimension: usize,
    pub max_concurrent_tasks: usize,
    pub frontend_dir: PathBuf,
    pub timeouts: TimeoutConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            host: "0.0.0.0".to_string(),
            port: 8000,
            database_url: None,
            vector_database_url: None,
            vector_dimension: 1536,
            max_concurrent_tasks: 5,
            frontend_dir: PathBuf::from("frontend"),
            timeouts: TimeoutConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub startup_step_secs: u64,
    pub teardown_step_secs: u64,
    pub shutdown_deadline_secs: u64,
    pub health_query_secs: u64,
    pub halt_grace_secs: u64,
    /// How long open HTTP connections get to finish once shutdown begins.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            startup_step_secs: 10,
            teardown_step_secs: 5,
            shutdown_deadline_secs: 30,
            health_query_secs: 2,
            halt_grace_secs: 5,
            drain_secs: 10,
        }
    }
}

impl TimeoutConfig {
    pub fn startup_step(&self) -> Duration {
        Duration::from_secs(self.startup_step_secs)
    }

    pub fn teardown_step(&self) -> Duration {
        Duration::from_secs(self.teardown_step_secs)
    }

    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_secs(self.shutdown_deadline_secs)
    }

    pub fn health_query(&self) -> Duration {
        Duration::from_secs(self.health_query_secs)
    }

    pub fn halt_grace(&self) -> Duration {
        Duration::from_secs(self.halt_grace_secs)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }
}

impl Config {
    /// Loads an optional TOML file, then layers environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("INNOCORE_DEBUG") {
            self.debug = parse_bool("INNOCORE_DEBUG", &raw)?;
        }
        if let Some(host) = lookup("INNOCORE_HOST") {
            self.host = host;
        }
        if let Some(raw) = lookup("INNOCORE_PORT") {
            self.port = parse_number("INNOCORE_PORT", &raw)?;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(url) = lookup("VECTOR_DATABASE_URL") {
            self.vector_database_url = Some(url);
        }
        if let Some(raw) = lookup("INNOCORE_MAX_CONCURRENT_TASKS") {
            self.max_concurrent_tasks = parse_number("INNOCORE_MAX_CONCURRENT_TASKS", &raw)?;
        }
        if let Some(dir) = lookup("INNOCORE_FRONTEND_DIR") {
            self.frontend_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_tasks == 0 {
            return Err(invalid("max_concurrent_tasks", "must be at least 1"));
        }
        if self.vector_dimension == 0 {
            return Err(invalid("vector_dimension", "must be at least 1"));
        }

        let timeouts = [
            ("timeouts.startup_step_secs", self.timeouts.startup_step_secs),
            ("timeouts.teardown_step_secs", self.timeouts.teardown_step_secs),
            ("timeouts.shutdown_deadline_secs", self.timeouts.shutdown_deadline_secs),
            ("timeouts.health_query_secs", self.timeouts.health_query_secs),
            ("timeouts.halt_grace_secs", self.timeouts.halt_grace_secs),
            ("timeouts.drain_secs", self.timeouts.drain_secs),
        ];
        for (key, value) in timeouts {
            if value == 0 {
                return Err(invalid(key, "must be at least 1 second"));
            }
        }

        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(invalid(key, &format!("expected a boolean, got {:?}", other))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| invalid(key, &format!("expected a number, got {:?}", raw)))
}
