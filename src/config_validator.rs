//! Configuration Validation
//!
//! HARDENING: Validates all configuration at startup.
//! Every violated rule is reported, not just the first one.

use std::time::Duration;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub value: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Invalid configuration for '{}': {} (value: {})",
            self.field, self.message, self.value
        )
    }
}

impl std::error::Error for ConfigValidationError {}

/// Result of config validation
pub type ConfigResult<T> = Result<T, Vec<ConfigValidationError>>;

/// Configuration validator
pub struct ConfigValidator {
    errors: Vec<ConfigValidationError>,
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    fn error(&mut self, field: &str, value: impl std::fmt::Display, message: &str) {
        self.errors.push(ConfigValidationError {
            field: field.to_string(),
            value: value.to_string(),
            message: message.to_string(),
        });
    }

    /// Validate port number (1-65535)
    pub fn validate_port(&mut self, field: &str, port: u16) -> &mut Self {
        if port == 0 {
            self.error(field, port, "Port must be between 1 and 65535");
        }
        self
    }

    /// Validate count is at least one
    pub fn validate_positive(&mut self, field: &str, value: usize) -> &mut Self {
        if value == 0 {
            self.error(field, value, "Value must be positive");
        }
        self
    }

    /// Validate `value >= min`, where `min` is the value of another field
    pub fn validate_at_least(
        &mut self,
        field: &str,
        value: usize,
        min_field: &str,
        min: usize,
    ) -> &mut Self {
        if value < min {
            self.error(
                field,
                value,
                &format!(
                    "Value must be greater than or equal to {} ({})",
                    min_field, min
                ),
            );
        }
        self
    }

    /// Validate a duration is not zero
    pub fn validate_non_zero_duration(&mut self, field: &str, value: Duration) -> &mut Self {
        if value.is_zero() {
            self.error(field, format!("{:?}", value), "Duration must be greater than zero");
        }
        self
    }

    /// Validate non-empty string
    pub fn validate_non_empty(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.error(field, value, "Value cannot be empty");
        }
        self
    }

    /// Merge errors collected by another validator
    pub fn extend(&mut self, errors: Vec<ConfigValidationError>) -> &mut Self {
        self.errors.extend(errors);
        self
    }

    /// Finish validation and return result
    pub fn finish(self) -> ConfigResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    /// Check if any errors occurred
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Get current errors
    pub fn errors(&self) -> &[ConfigValidationError] {
        &self.errors
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Format validation errors for display
pub fn format_validation_errors(errors: &[ConfigValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_validation() {
        let mut v = ConfigValidator::new();
        v.validate_port("port", 8080);
        assert!(v.finish().is_ok());

        let mut v = ConfigValidator::new();
        v.validate_port("port", 0);
        assert!(v.finish().is_err());
    }

    #[test]
    fn test_at_least() {
        let mut v = ConfigValidator::new();
        v.validate_at_least("backlog_limit", 12, "in_flight_per_tenant", 12);
        assert!(v.finish().is_ok());

        let mut v = ConfigValidator::new();
        v.validate_at_least("backlog_limit", 3, "in_flight_per_tenant", 12);
        let err = v.finish().unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err[0].message.contains("in_flight_per_tenant"));
    }

    #[test]
    fn test_non_zero_duration() {
        let mut v = ConfigValidator::new();
        v.validate_non_zero_duration("timeout", Duration::from_micros(1));
        assert!(!v.has_errors());

        v.validate_non_zero_duration("timeout", Duration::ZERO);
        let err = v.finish().unwrap_err();
        assert!(err[0].message.contains("greater than zero"));
        assert_eq!(err[0].value, "0ns");
    }

    #[test]
    fn test_multiple_errors() {
        let mut v = ConfigValidator::new();
        v.validate_port("port", 0)
            .validate_positive("in_flight", 0)
            .validate_non_empty("filter", "");

        assert!(v.has_errors());
        let errors = v.finish().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_format_validation_errors() {
        let mut v = ConfigValidator::new();
        v.validate_positive("a", 0).validate_positive("b", 0);
        let text = format_validation_errors(v.errors());
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with("  - "));
    }
}
