//! CLI command implementations
//!
//! `serve` boots in a fixed order: config, logging, panic hook, metric
//! descriptions, throttle, then the listener. Any failure before the listener
//! is bound aborts startup.

use std::path::Path;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::ServiceConfig;
use crate::http_server::HttpServer;
use crate::panic_handler::init_panic_handler;
use crate::throttle::{metric_definitions, Throttle};

use super::args::Command;
use super::errors::CliResult;

/// Run a parsed command to completion
pub async fn run(command: Command) -> CliResult<()> {
    match command {
        Command::Serve { config, port } => serve(config.as_deref(), port).await,
        Command::CheckConfig { config } => check_config(&config),
    }
}

fn load_config(path: Option<&Path>) -> CliResult<ServiceConfig> {
    match path {
        Some(path) => Ok(ServiceConfig::load(path)?),
        None => Ok(ServiceConfig::default()),
    }
}

/// `RUST_LOG` takes precedence over the configured filter
fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn serve(config_path: Option<&Path>, port: Option<u16>) -> CliResult<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }

    init_tracing(&config.logging.filter);
    init_panic_handler(config.logging.crash_log.clone());
    metric_definitions::describe_metrics();

    let throttle = Throttle::new(config.throttle.clone()).map_err(|e| {
        error!(error = %e, "throttle construction failed");
        e
    })?;
    info!(
        in_flight_per_tenant = config.throttle.in_flight_per_tenant,
        backlog_per_tenant = config.throttle.backlog_per_tenant,
        backlog_limit = config.throttle.backlog_limit,
        backlog_timeout = ?config.throttle.backlog_timeout,
        "throttle ready"
    );

    HttpServer::new(config.server, throttle).start().await?;
    Ok(())
}

fn check_config(path: &Path) -> CliResult<()> {
    let config = ServiceConfig::load(path)?;
    println!("Configuration OK: {}", path.display());
    println!(
        "  throttle: in_flight_per_tenant={} backlog_per_tenant={} backlog_limit={} backlog_timeout={:?}",
        config.throttle.in_flight_per_tenant,
        config.throttle.backlog_per_tenant,
        config.throttle.backlog_limit,
        config.throttle.backlog_timeout,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::errors::CliError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_defaults_without_path() {
        let config = load_config(None).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_check_config_valid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[throttle]\nbacklog_limit = 20").unwrap();
        check_config(file.path()).unwrap();
    }

    #[test]
    fn test_check_config_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[throttle]\nin_flight_per_tenant = 0").unwrap();

        let err = check_config(file.path()).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(err.code(), "CONFIG_INVALID");
        assert_eq!(err.exit_code(), 1);
    }
}
