use crate::error::{Result, ShopError};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://cidgrowthmedia.com/api/v2";
pub const DEFAULT_SERVICE_ID: u32 = 1313;

/// Retry behaviour for calls to the external order API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
    /// Per-attempt request timeout.
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Connection settings for the external order API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_key: String,
    pub base_url: String,
    pub service_id: u32,
    pub retry: RetryPolicy,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_API_URL.to_string(),
            service_id: DEFAULT_SERVICE_ID,
            retry: RetryPolicy::default(),
        }
    }
}

impl ApiConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(ShopError::Config("API retries must be at least 1".to_string()));
        }
        if self.retry.request_timeout.is_zero() {
            return Err(ShopError::Config("API timeout must be positive".to_string()));
        }
        url::Url::parse(&self.base_url)
            .map_err(|e| ShopError::Config(format!("invalid API URL {}: {}", self.base_url, e)))?;
        Ok(())
    }
}

/// Splits a comma separated id list, dropping blanks.
pub fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(5));
        assert_eq!(policy.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = ApiConfig::default();
        assert!(config.validate().is_ok());
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ShopError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = ApiConfig {
            base_url: "not a url".to_string(),
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list(" 1, 2,,3 "), vec!["1", "2", "3"]);
        assert!(parse_id_list("").is_empty());
    }
}
