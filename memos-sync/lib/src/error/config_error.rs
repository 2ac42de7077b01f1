//! Configuration errors.

use thiserror::Error;

/// Errors raised while reading configuration from the environment.
///
/// Every variant names the offending variable so the diagnostic can be
/// acted on before any network call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required variable is not set (or is empty).
    #[error("Missing required environment variable: {var}")]
    Missing {
        /// The name of the missing variable.
        var: &'static str,
    },

    /// A variable is set but its value cannot be used.
    #[error("Invalid value for {var} ({value:?}): {reason}")]
    Invalid {
        /// The name of the variable.
        var: &'static str,
        /// The raw value that was rejected.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates a missing variable error.
    pub fn missing(var: &'static str) -> Self {
        Self::Missing { var }
    }

    /// Creates an invalid value error.
    pub fn invalid(var: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_names_the_variable() {
        let err = ConfigError::missing("MEMOS_HOST");
        assert_eq!(
            err.to_string(),
            "Missing required environment variable: MEMOS_HOST"
        );
    }

    #[test]
    fn invalid_includes_value_and_reason() {
        let err = ConfigError::invalid("PAGE_SIZE", "lots", "expected a positive integer");
        let display = err.to_string();
        assert!(display.contains("PAGE_SIZE"));
        assert!(display.contains("\"lots\""));
        assert!(display.contains("expected a positive integer"));
    }
}
