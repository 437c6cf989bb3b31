//! Error types for supervisor configuration.

use thiserror::Error;

/// Rejected timing configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The probe interval is zero; a periodic timer cannot run on it.
    #[error("probe interval must be greater than zero")]
    ZeroProbeInterval,

    /// The response timeout is zero; a periodic timer cannot run on it.
    #[error("response timeout must be greater than zero")]
    ZeroResponseTimeout,
}

/// Result alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_zero_probe_interval() {
        let err = ConfigError::ZeroProbeInterval;
        assert_eq!(err.to_string(), "probe interval must be greater than zero");
    }

    #[test]
    fn display_zero_response_timeout() {
        let err = ConfigError::ZeroResponseTimeout;
        assert_eq!(
            err.to_string(),
            "response timeout must be greater than zero"
        );
    }

    #[test]
    fn variants_compare() {
        assert_eq!(ConfigError::ZeroProbeInterval, ConfigError::ZeroProbeInterval);
        assert_ne!(
            ConfigError::ZeroProbeInterval,
            ConfigError::ZeroResponseTimeout
        );
    }
}
