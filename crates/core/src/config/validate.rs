use super::{types::Config, ConfigError};

/// Validate configuration beyond what serde enforces.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "retry.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.retry.cooldown_base_secs > config.retry.cooldown_cap_secs {
        return Err(ConfigError::ValidationError(format!(
            "retry.cooldown_base_secs ({}) exceeds retry.cooldown_cap_secs ({})",
            config.retry.cooldown_base_secs, config.retry.cooldown_cap_secs
        )));
    }

    if !(0.0..=1.0).contains(&config.retry.jitter_fraction) {
        return Err(ConfigError::ValidationError(
            "retry.jitter_fraction must be between 0.0 and 1.0".to_string(),
        ));
    }

    if config.throttle.requests_per_minute == 0 {
        return Err(ConfigError::ValidationError(
            "throttle.requests_per_minute must be at least 1".to_string(),
        ));
    }

    if !(0.0..=100.0).contains(&config.batching.min_missing_percent) {
        return Err(ConfigError::ValidationError(
            "batching.min_missing_percent must be between 0 and 100".to_string(),
        ));
    }

    if config.batching.max_batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "batching.max_batch_size must be at least 1".to_string(),
        ));
    }

    if config.sync.page_size == 0 {
        return Err(ConfigError::ValidationError(
            "sync.page_size must be at least 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_max_attempts_fails() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_base_above_cap_fails() {
        let mut config = Config::default();
        config.retry.cooldown_base_secs = 100;
        config.retry.cooldown_cap_secs = 50;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_jitter_out_of_range_fails() {
        let mut config = Config::default();
        config.retry.jitter_fraction = 1.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_rpm_fails() {
        let mut config = Config::default();
        config.throttle.requests_per_minute = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_percent_out_of_range_fails() {
        let mut config = Config::default();
        config.batching.min_missing_percent = 120.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_page_size_fails() {
        let mut config = Config::default();
        config.sync.page_size = 0;
        assert!(validate_config(&config).is_err());
    }
}
