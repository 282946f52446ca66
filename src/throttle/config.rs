//! Throttle configuration
//!
//! Limits must satisfy:
//! - `in_flight_per_tenant >= 1`
//! - `backlog_per_tenant >= in_flight_per_tenant`
//! - `backlog_limit >= in_flight_per_tenant`
//! - `backlog_timeout` is not zero
//!
//! Violations are fatal at construction. The timeout has no upper bound and
//! keeps full precision; in TOML it is written in whole milliseconds.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config_validator::{ConfigResult, ConfigValidator};

/// Computes the `Retry-After` hint. The argument is true when the caller's
/// context had ended (cancelled before or while queued).
pub type RetryAfterFn = Arc<dyn Fn(bool) -> Duration + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Requests a single tenant may have executing at once
    pub in_flight_per_tenant: usize,

    /// Requests a single tenant may have queued
    pub backlog_per_tenant: usize,

    /// Requests the process holds across all tenants, queued or executing
    pub backlog_limit: usize,

    /// Max time a request may wait in a tenant queue
    #[serde(rename = "backlog_timeout_ms", with = "duration_ms")]
    pub backlog_timeout: Duration,

    /// Constant `Retry-After` hint in seconds; no header when unset
    pub retry_after_secs: Option<u64>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            in_flight_per_tenant: 12,
            backlog_per_tenant: 5000,
            backlog_limit: 10000,
            backlog_timeout: Duration::from_secs(30),
            retry_after_secs: None,
        }
    }
}

impl ThrottleConfig {
    pub fn new(
        in_flight_per_tenant: usize,
        backlog_per_tenant: usize,
        backlog_limit: usize,
        backlog_timeout: Duration,
    ) -> Self {
        Self {
            in_flight_per_tenant,
            backlog_per_tenant,
            backlog_limit,
            backlog_timeout,
            retry_after_secs: None,
        }
    }

    pub fn backlog_timeout(&self) -> Duration {
        self.backlog_timeout
    }

    /// Retry-after function derived from `retry_after_secs`
    pub fn retry_after_fn(&self) -> Option<RetryAfterFn> {
        self.retry_after_secs.map(|secs| {
            let hint = Duration::from_secs(secs);
            Arc::new(move |_context_done: bool| hint) as RetryAfterFn
        })
    }

    /// Check limit ordering. Field names are prefixed with `prefix`.
    pub fn validate(&self, prefix: &str) -> ConfigResult<()> {
        let field = |name: &str| {
            if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}.{}", prefix, name)
            }
        };

        let mut v = ConfigValidator::new();
        v.validate_positive(&field("in_flight_per_tenant"), self.in_flight_per_tenant)
            .validate_at_least(
                &field("backlog_per_tenant"),
                self.backlog_per_tenant,
                "in_flight_per_tenant",
                self.in_flight_per_tenant,
            )
            .validate_at_least(
                &field("backlog_limit"),
                self.backlog_limit,
                "in_flight_per_tenant",
                self.in_flight_per_tenant,
            )
            .validate_non_zero_duration(&field("backlog_timeout_ms"), self.backlog_timeout);
        v.finish()
    }
}

/// `Duration` as whole milliseconds. Sub-millisecond values round up so a
/// non-zero timeout never serializes as zero.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = value.as_nanos().div_ceil(1_000_000);
        serializer.serialize_u64(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ThrottleConfig::default().validate("throttle").is_ok());
    }

    #[test]
    fn test_zero_in_flight() {
        let config = ThrottleConfig::new(0, 4, 9, Duration::from_millis(50));
        let errors = config.validate("").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "in_flight_per_tenant");
    }

    #[test]
    fn test_ordering_violations_all_reported() {
        let config = ThrottleConfig::new(4, 2, 3, Duration::from_millis(50));
        let errors = config.validate("throttle").unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["throttle.backlog_per_tenant", "throttle.backlog_limit"]
        );
    }

    #[test]
    fn test_equal_limits_accepted() {
        let config = ThrottleConfig::new(2, 2, 2, Duration::from_millis(50));
        assert!(config.validate("").is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ThrottleConfig::new(2, 4, 9, Duration::ZERO);
        let errors = config.validate("").unwrap_err();
        assert_eq!(errors[0].field, "backlog_timeout_ms");
    }

    #[test]
    fn test_long_and_sub_millisecond_timeouts_accepted() {
        let long = ThrottleConfig::new(2, 4, 9, Duration::from_secs(2 * 60 * 60));
        assert!(long.validate("").is_ok());
        assert_eq!(long.backlog_timeout(), Duration::from_secs(7200));

        let short = ThrottleConfig::new(2, 4, 9, Duration::from_micros(500));
        assert!(short.validate("").is_ok());
        assert_eq!(short.backlog_timeout(), Duration::from_micros(500));
    }

    #[test]
    fn test_timeout_toml_in_milliseconds() {
        let config: ThrottleConfig = toml::from_str("backlog_timeout_ms = 250").unwrap();
        assert_eq!(config.backlog_timeout(), Duration::from_millis(250));

        let short = ThrottleConfig::new(2, 4, 9, Duration::from_micros(500));
        let encoded = serde_json::to_value(&short).unwrap();
        assert_eq!(encoded["backlog_timeout_ms"], 1);
    }

    #[test]
    fn test_retry_after_fn() {
        let mut config = ThrottleConfig::default();
        assert!(config.retry_after_fn().is_none());

        config.retry_after_secs = Some(3);
        let f = config.retry_after_fn().unwrap();
        assert_eq!(f(false), Duration::from_secs(3));
        assert_eq!(f(true), Duration::from_secs(3));
    }

    #[test]
    fn test_toml_partial() {
        let config: ThrottleConfig = toml::from_str("in_flight_per_tenant = 4").unwrap();
        assert_eq!(config.in_flight_per_tenant, 4);
        assert_eq!(config.backlog_limit, 10000);
    }
}
