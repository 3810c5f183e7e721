//! Configuration validation.

use super::Config;
use crate::error::{ChecksumError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.query.poll_interval_ms == 0 {
        return Err(ChecksumError::Config(
            "query.poll_interval_ms must be at least 1".into(),
        ));
    }
    if let Some(0) = config.query.max_poll_attempts {
        return Err(ChecksumError::Config(
            "query.max_poll_attempts must be at least 1 (omit it for unbounded polling)".into(),
        ));
    }
    if config.query.output_location.trim().is_empty() {
        return Err(ChecksumError::Config(
            "query.output_location is required".into(),
        ));
    }

    if config.notification.queue.trim().is_empty() {
        return Err(ChecksumError::Config("notification.queue is required".into()));
    }

    if config.source.connect_timeout_secs == 0 {
        return Err(ChecksumError::Config(
            "source.connect_timeout_secs must be at least 1".into(),
        ));
    }
    if config.source.oracle_odbc_driver.trim().is_empty() {
        return Err(ChecksumError::Config(
            "source.oracle_odbc_driver is required".into(),
        ));
    }

    if config.credentials.file.is_none() && config.credentials.env_prefix.is_empty() {
        return Err(ChecksumError::Config(
            "credentials.env_prefix must be set when credentials.file is absent".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_poll_interval() {
        let mut config = Config::default();
        config.query.poll_interval_ms = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_max_poll_attempts() {
        let mut config = Config::default();
        config.query.max_poll_attempts = Some(0);
        assert!(validate(&config).is_err());

        config.query.max_poll_attempts = Some(1);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_queue() {
        let mut config = Config::default();
        config.notification.queue = "  ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_connect_timeout() {
        let mut config = Config::default();
        config.source.connect_timeout_secs = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_env_prefix_needs_file() {
        let mut config = Config::default();
        config.credentials.env_prefix = String::new();
        assert!(validate(&config).is_err());

        config.credentials.file = Some("secrets.yaml".into());
        assert!(validate(&config).is_ok());
    }
}
