//! Pipeline configuration for the orchestrator.
//!
//! This module provides the tunables of a run: the seed URL cap, the
//! per-step timeouts, fan-out width, the degraded-fingerprint policy and the
//! identification header used for page fetches.

use std::time::Duration;

use crate::error::ConfigError;
use crate::fetch::DEFAULT_USER_AGENT;

/// Hard upper bound on seed URLs admitted per run.
pub const MAX_SEED_URLS: usize = 3;

/// Configuration for the pipeline orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Seed URLs admitted per run, at most [`MAX_SEED_URLS`]; excess is dropped.
    pub max_seed_urls: usize,
    /// Timeout for one page fetch.
    pub fetch_timeout: Duration,
    /// Wall-clock bound on one extraction program run.
    pub execution_timeout: Duration,
    /// Maximum items processed concurrently inside a fan-out stage.
    pub fanout_concurrency: usize,
    /// Synthesize programs for fallback fingerprints of failed probes.
    pub synthesize_degraded: bool,
    /// `User-Agent` sent with every page fetch.
    pub user_agent: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_seed_urls: MAX_SEED_URLS,
            fetch_timeout: Duration::from_secs(10),
            execution_timeout: Duration::from_secs(45),
            fanout_concurrency: 3,
            synthesize_degraded: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TRENDFORGE_MAX_SEED_URLS`: Seed URL cap, 1 to 3 (default: 3)
    /// - `TRENDFORGE_FETCH_TIMEOUT_SECS`: Page fetch timeout (default: 10)
    /// - `TRENDFORGE_EXECUTION_TIMEOUT_SECS`: Program run timeout (default: 45)
    /// - `TRENDFORGE_FANOUT_CONCURRENCY`: Fan-out width (default: 3)
    /// - `TRENDFORGE_SYNTHESIZE_DEGRADED`: Synthesize for failed probes (default: false)
    /// - `TRENDFORGE_USER_AGENT`: Fetch identification header
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`PipelineConfig::from_env`], reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("TRENDFORGE_MAX_SEED_URLS") {
            config.max_seed_urls = parse_env_value(&val, "TRENDFORGE_MAX_SEED_URLS")?;
        }

        if let Some(val) = lookup("TRENDFORGE_FETCH_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "TRENDFORGE_FETCH_TIMEOUT_SECS")?;
            config.fetch_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("TRENDFORGE_EXECUTION_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "TRENDFORGE_EXECUTION_TIMEOUT_SECS")?;
            config.execution_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("TRENDFORGE_FANOUT_CONCURRENCY") {
            config.fanout_concurrency = parse_env_value(&val, "TRENDFORGE_FANOUT_CONCURRENCY")?;
        }

        if let Some(val) = lookup("TRENDFORGE_SYNTHESIZE_DEGRADED") {
            config.synthesize_degraded = parse_env_bool(&val, "TRENDFORGE_SYNTHESIZE_DEGRADED")?;
        }

        if let Some(val) = lookup("TRENDFORGE_USER_AGENT") {
            config.user_agent = val;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_seed_urls == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_seed_urls must be greater than 0".to_string(),
            ));
        }

        if self.max_seed_urls > MAX_SEED_URLS {
            return Err(ConfigError::ValidationFailed(format!(
                "max_seed_urls must be at most {}, got {}",
                MAX_SEED_URLS, self.max_seed_urls
            )));
        }

        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "fetch_timeout must be greater than 0".to_string(),
            ));
        }

        if self.execution_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "execution_timeout must be greater than 0".to_string(),
            ));
        }

        if self.fanout_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "fanout_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "user_agent cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the seed URL cap.
    pub fn with_max_seed_urls(mut self, max: usize) -> Self {
        self.max_seed_urls = max;
        self
    }

    /// Builder method to set the page fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Builder method to set the program run timeout.
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    /// Builder method to set fan-out width.
    pub fn with_fanout_concurrency(mut self, width: usize) -> Self {
        self.fanout_concurrency = width;
        self
    }

    /// Builder method to set the degraded-fingerprint policy.
    pub fn with_synthesize_degraded(mut self, enabled: bool) -> Self {
        self.synthesize_degraded = enabled;
        self
    }

    /// Builder method to set the fetch `User-Agent`.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_seed_urls, 3);
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.execution_timeout, Duration::from_secs(45));
        assert_eq!(config.fanout_concurrency, 3);
        assert!(!config.synthesize_degraded);
        assert!(config.user_agent.starts_with("Mozilla/5.0"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_max_seed_urls(2)
            .with_fetch_timeout(Duration::from_secs(3))
            .with_execution_timeout(Duration::from_secs(60))
            .with_fanout_concurrency(1)
            .with_synthesize_degraded(true)
            .with_user_agent("trendforge-test");

        assert_eq!(config.max_seed_urls, 2);
        assert_eq!(config.fetch_timeout, Duration::from_secs(3));
        assert_eq!(config.execution_timeout, Duration::from_secs(60));
        assert_eq!(config.fanout_concurrency, 1);
        assert!(config.synthesize_degraded);
        assert_eq!(config.user_agent, "trendforge-test");
    }

    #[test]
    fn test_from_lookup_reads_values() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("TRENDFORGE_MAX_SEED_URLS", "2"),
            ("TRENDFORGE_EXECUTION_TIMEOUT_SECS", " 30 "),
            ("TRENDFORGE_SYNTHESIZE_DEGRADED", "yes"),
        ]))
        .expect("valid config");

        assert_eq!(config.max_seed_urls, 2);
        assert_eq!(config.execution_timeout, Duration::from_secs(30));
        assert!(config.synthesize_degraded);
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let err = PipelineConfig::from_lookup(lookup(&[("TRENDFORGE_FANOUT_CONCURRENCY", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("TRENDFORGE_FANOUT_CONCURRENCY"));

        let err = PipelineConfig::from_lookup(lookup(&[("TRENDFORGE_SYNTHESIZE_DEGRADED", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("expected boolean"));

        let err = PipelineConfig::from_lookup(lookup(&[("TRENDFORGE_MAX_SEED_URLS", "7")]))
            .unwrap_err();
        assert!(err.to_string().contains("max_seed_urls must be at most 3"));

        let err = PipelineConfig::from_lookup(lookup(&[("TRENDFORGE_FETCH_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("fetch_timeout"));
    }

    #[test]
    fn test_validation_invalid_values() {
        let cases = [
            (PipelineConfig::default().with_max_seed_urls(0), "max_seed_urls"),
            (PipelineConfig::default().with_max_seed_urls(4), "at most 3"),
            (
                PipelineConfig::default().with_execution_timeout(Duration::ZERO),
                "execution_timeout",
            ),
            (PipelineConfig::default().with_fanout_concurrency(0), "fanout_concurrency"),
            (PipelineConfig::default().with_user_agent("  "), "user_agent"),
        ];
        for (config, field) in cases {
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(field), "{field}: {err}");
        }
    }
}
