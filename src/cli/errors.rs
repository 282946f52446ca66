//! CLI errors and exit codes

use thiserror::Error;

use crate::config::ConfigError;
use crate::throttle::ThrottleError;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Throttle(#[from] ThrottleError),

    #[error("HTTP server failed: {0}")]
    Server(#[from] std::io::Error),
}

impl CliError {
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(e) => e.code(),
            CliError::Throttle(e) => e.code(),
            CliError::Server(_) => "SERVER_ERROR",
        }
    }

    /// Process exit code
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(e) => e.exit_code(),
            CliError::Throttle(_) => 1,
            CliError::Server(_) => 3,
        }
    }
}
