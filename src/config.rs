//! Service configuration
//!
//! Loaded from a TOML file. Every section and field is optional:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 8080
//!
//! [throttle]
//! in_flight_per_tenant = 12
//! backlog_per_tenant = 5000
//! backlog_limit = 10000
//! backlog_timeout_ms = 30000
//! retry_after_secs = 1
//!
//! [logging]
//! filter = "info,tenant_gate=debug"
//! crash_log = "/var/log/tenant-gate/crash.log"
//! ```

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config_validator::{format_validation_errors, ConfigValidationError, ConfigValidator};
use crate::throttle::ThrottleConfig;

pub type ConfigLoadResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Invalid(Vec<ConfigValidationError>),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "CONFIG_IO",
            ConfigError::Parse { .. } => "CONFIG_PARSE",
            ConfigError::Invalid(_) => "CONFIG_INVALID",
        }
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            ConfigError::Io { .. } => 2,
            ConfigError::Parse { .. } | ConfigError::Invalid(_) => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([127, 0, 0, 1]),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives; `RUST_LOG` wins when set
    pub filter: String,
    pub crash_log: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            crash_log: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub throttle: ThrottleConfig,
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Read, parse and validate a config file
    pub fn load(path: &Path) -> ConfigLoadResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: ServiceConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check every section, reporting all problems at once
    pub fn validate(&self) -> ConfigLoadResult<()> {
        let mut v = ConfigValidator::new();
        v.validate_port("server.port", self.server.port)
            .validate_non_empty("logging.filter", &self.logging.filter);
        if let Err(errors) = self.throttle.validate("throttle") {
            v.extend(errors);
        }
        v.finish().map_err(ConfigError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = write_config("");
        let config = ServiceConfig::load(file.path()).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.throttle.in_flight_per_tenant, 12);
        assert_eq!(config.throttle.backlog_limit, 10000);
    }

    #[test]
    fn test_partial_sections() {
        let file = write_config(
            r#"
            [server]
            port = 9090

            [throttle]
            in_flight_per_tenant = 2
            backlog_per_tenant = 4
            backlog_limit = 9
            backlog_timeout_ms = 50
            retry_after_secs = 1
            "#,
        );
        let config = ServiceConfig::load(file.path()).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.bind, ServerConfig::default().bind);
        assert_eq!(config.throttle.backlog_limit, 9);
        assert_eq!(config.throttle.retry_after_secs, Some(1));
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_missing_file() {
        let err = ServiceConfig::load(Path::new("/nonexistent/tenant-gate.toml")).unwrap_err();
        assert_eq!(err.code(), "CONFIG_IO");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_malformed_toml() {
        let file = write_config("[throttle\nbacklog_limit = ");
        let err = ServiceConfig::load(file.path()).unwrap_err();
        assert_eq!(err.code(), "CONFIG_PARSE");
    }

    #[test]
    fn test_all_violations_reported() {
        let file = write_config(
            r#"
            [server]
            port = 0

            [throttle]
            in_flight_per_tenant = 4
            backlog_per_tenant = 2
            backlog_limit = 3

            [logging]
            filter = ""
            "#,
        );
        let err = ServiceConfig::load(file.path()).unwrap_err();
        let ConfigError::Invalid(errors) = &err else {
            panic!("expected validation error, got {:?}", err);
        };

        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"server.port"));
        assert!(fields.contains(&"logging.filter"));
        assert!(fields.contains(&"throttle.backlog_per_tenant"));
        assert!(fields.contains(&"throttle.backlog_limit"));
        assert!(err.to_string().contains("throttle.backlog_limit"));
    }
}
