use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Retry policy is usable (at least one attempt, non-zero growth)
/// - Configured integration targets carry a URL and a credential
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let retry = &config.integrations.retry;
    if retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "integrations.retry.max_attempts must be at least 1".to_string(),
        ));
    }
    if retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::ValidationError(
            "integrations.retry.backoff_multiplier must be >= 1.0".to_string(),
        ));
    }
    if config.integrations.queue_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "integrations.queue_capacity must be at least 1".to_string(),
        ));
    }

    if let Some(ref jira) = config.integrations.jira {
        if jira.url.is_empty() || jira.api_token.is_empty() || jira.project_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "integrations.jira requires url, api_token and project_key".to_string(),
            ));
        }
    }
    if let Some(ref github) = config.integrations.github {
        if github.url.is_empty() || github.token.is_empty() || !github.repo.contains('/') {
            return Err(ConfigError::ValidationError(
                "integrations.github requires url, token and a repo in owner/name form".to_string(),
            ));
        }
    }
    if let Some(ref testrail) = config.integrations.testrail {
        if testrail.url.is_empty() || testrail.api_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "integrations.testrail requires url and api_key".to_string(),
            ));
        }
    }

    Ok(())
}
