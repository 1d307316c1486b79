//! Shared retry utilities for upstream fetches.
//!
//! Feed polls and ref lookups can fail transiently (connection resets, DNS
//! hiccups); these are retried with exponential backoff before surfacing an
//! error. Push failures are deliberately NOT handled here - they go through
//! the bounded checkout-rebuild cycle in the reconciler.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Initial delay before the first retry.
pub const INITIAL_BACKOFF_MS: u64 = 500;

/// Upper bound on the delay between retries.
pub const MAX_BACKOFF_MS: u64 = 15_000;

/// Maximum number of retry attempts for transient network failures.
pub const MAX_NETWORK_RETRIES: usize = 3;

/// Configuration for retry operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Minimum delay between retries.
    pub min_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Maximum number of retry attempts.
    pub max_retries: usize,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_retries: MAX_NETWORK_RETRIES,
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom values.
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            with_jitter: true,
        }
    }

    /// Build an exponential backoff strategy from this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}

/// Build the default exponential backoff strategy for upstream fetches.
///
/// # Example
///
/// ```ignore
/// use backon::Retryable;
/// use shepherd::retry::default_backoff;
///
/// let response = (|| async { client.get(url).send().await })
///     .retry(default_backoff())
///     .when(|e| e.is_connect() || e.is_timeout())
///     .await?;
/// ```
#[must_use]
pub fn default_backoff() -> ExponentialBuilder {
    RetryConfig::default().into_backoff()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();

        assert_eq!(config.min_delay, Duration::from_millis(INITIAL_BACKOFF_MS));
        assert_eq!(config.max_delay, Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(config.max_retries, MAX_NETWORK_RETRIES);
        assert!(config.with_jitter);
    }

    #[test]
    fn test_retry_config_custom() {
        let config = RetryConfig::new(Duration::from_secs(2), Duration::from_secs(30), 5);

        assert_eq!(config.min_delay, Duration::from_secs(2));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_default_backoff_creates_builder() {
        let _backoff = default_backoff();
    }
}
