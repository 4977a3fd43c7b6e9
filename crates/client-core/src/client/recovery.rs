//! Error recovery and retry mechanisms for client operations
//!
//! This module provides utilities for handling transient failures: a
//! configurable retry combinator with backoff and jitter, timeout wrapping,
//! and error context helpers. The render binder's attach-with-retry and the
//! signaling request path are both built on [`retry_with_backoff`] rather
//! than hand-rolled polling loops.

use crate::error::{ClientError, ClientResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Configuration for retry behavior
///
/// Defines maximum attempts, delay strategy, and backoff behavior for
/// operations that encounter recoverable errors.
///
/// # Examples
///
/// ```rust
/// # use medilink_client_core::client::recovery::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::default();
/// assert_eq!(config.max_attempts, 3);
/// assert_eq!(config.initial_delay, Duration::from_millis(100));
/// assert_eq!(config.backoff_multiplier, 2.0);
/// assert!(config.use_jitter);
///
/// // Sink attach probes use a flat cadence instead of backoff.
/// let probe = RetryConfig::fixed(10, Duration::from_millis(500));
/// assert_eq!(probe.max_attempts, 10);
/// assert_eq!(probe.max_delay, Duration::from_millis(500));
/// assert!(!probe.use_jitter);
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Configuration for quick retries (e.g., signaling requests)
    pub fn quick() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 1.5,
            use_jitter: true,
        }
    }

    /// Configuration with a fixed delay and no backoff
    ///
    /// Used for the sink attach probe, where the wait is for a UI surface to
    /// mount rather than for a remote system to recover; a flat cadence with
    /// a hard attempt budget is the right shape there.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            use_jitter: false,
        }
    }
}

/// Retry an operation with backoff
///
/// Executes an async operation with automatic retry. The operation is retried
/// only while it fails with a recoverable error (per
/// [`ClientError::is_recoverable`]) and attempts remain; non-recoverable
/// errors return immediately.
///
/// # Examples
///
/// ```rust
/// # use medilink_client_core::client::recovery::{retry_with_backoff, RetryConfig};
/// # use medilink_client_core::error::{ClientError, ClientResult};
/// # use std::sync::atomic::{AtomicU32, Ordering};
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let attempts = AtomicU32::new(0);
///
/// let result = retry_with_backoff(
///     "signaling_request",
///     RetryConfig::quick(),
///     || async {
///         let current = attempts.fetch_add(1, Ordering::SeqCst) + 1;
///         if current < 3 {
///             Err(ClientError::signaling_unreachable("connection timeout"))
///         } else {
///             Ok("authorized".to_string())
///         }
///     }
/// ).await?;
///
/// assert_eq!(result, "authorized");
/// assert_eq!(attempts.load(Ordering::SeqCst), 3);
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> ClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        debug!(
            operation = operation_name,
            attempt = attempt,
            max_attempts = config.max_attempts,
            "Attempting operation"
        );

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retries"
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_recoverable() && attempt < config.max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %e,
                    category = e.category(),
                    next_delay_ms = delay.as_millis(),
                    "Recoverable error, will retry"
                );

                // Apply jitter if configured
                let actual_delay = if config.use_jitter {
                    let jitter = (rand::random::<f64>() - 0.5) * 0.2; // ±10% jitter
                    let millis = delay.as_millis() as f64;
                    Duration::from_millis((millis * (1.0 + jitter)) as u64)
                } else {
                    delay
                };

                sleep(actual_delay).await;

                // Calculate next delay with exponential backoff
                let next_delay_ms = (delay.as_millis() as f64 * config.backoff_multiplier) as u64;
                delay = Duration::from_millis(next_delay_ms).min(config.max_delay);
            }
            Err(e) => {
                if attempt >= config.max_attempts {
                    error!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %e,
                        "Operation failed after all retry attempts"
                    );
                } else {
                    error!(
                        operation = operation_name,
                        error = %e,
                        category = e.category(),
                        "Non-recoverable error, not retrying"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Context-aware error wrapper
///
/// Extends `ClientResult<T>` with context-adding capabilities for debugging
/// and logging. Wrapping collapses the error into
/// [`ClientError::InternalError`], so it belongs on paths where the caller
/// no longer branches on the error kind.
///
/// ```rust
/// # use medilink_client_core::client::recovery::ErrorContext;
/// # use medilink_client_core::error::{ClientError, ClientResult};
/// fn enumerate() -> ClientResult<Vec<String>> {
///     Err(ClientError::transport_failed("socket closed"))
/// }
///
/// let result = enumerate().context("Failed to enumerate remote participants");
/// assert!(matches!(result, Err(ClientError::InternalError { .. })));
/// ```
pub trait ErrorContext<T> {
    /// Add context to the error
    fn context(self, context: &str) -> ClientResult<T>;

    /// Add context with lazy evaluation
    fn with_context<F>(self, f: F) -> ClientResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ErrorContext<T> for ClientResult<T> {
    fn context(self, context: &str) -> ClientResult<T> {
        self.map_err(|e| {
            error!(
                error = %e,
                context = context,
                category = e.category(),
                "Operation failed with context"
            );
            ClientError::InternalError {
                message: format!("{}: {}", context, e),
            }
        })
    }

    fn with_context<F>(self, f: F) -> ClientResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let context = f();
            error!(
                error = %e,
                context = %context,
                category = e.category(),
                "Operation failed with context"
            );
            ClientError::InternalError {
                message: format!("{}: {}", context, e),
            }
        })
    }
}

/// Add an operation timeout with proper error conversion
///
/// Wraps an async operation with a timeout, converting an elapsed timer into
/// [`ClientError::OperationTimeout`] with structured logging.
///
/// ```rust
/// # use medilink_client_core::client::recovery::with_timeout;
/// # use medilink_client_core::error::{ClientError, ClientResult};
/// # use std::time::Duration;
/// # #[tokio::main]
/// # async fn main() {
/// let result: ClientResult<&str> = with_timeout(
///     "slow_operation",
///     Duration::from_millis(50),
///     async {
///         tokio::time::sleep(Duration::from_secs(5)).await;
///         Ok("unreachable")
///     }
/// ).await;
///
/// assert!(matches!(result, Err(ClientError::OperationTimeout { duration_ms: 50 })));
/// # }
/// ```
pub async fn with_timeout<T, F>(operation_name: &str, timeout: Duration, future: F) -> ClientResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            error!(
                operation = operation_name,
                timeout_ms = timeout.as_millis(),
                "Operation timed out"
            );
            Err(ClientError::OperationTimeout {
                duration_ms: timeout.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_retry_with_backoff_success() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let attempts = AtomicU32::new(0);

        let result = retry_with_backoff("test_operation", RetryConfig::quick(), || async {
            let current = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if current < 3 {
                Err(ClientError::signaling_unreachable("temporary failure"))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_non_recoverable() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let attempts = AtomicU32::new(0);

        let result: Result<i32, _> =
            retry_with_backoff("test_operation", RetryConfig::default(), || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::credential_rejected("Appointment not found"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1); // Should not retry
    }

    #[tokio::test]
    async fn test_fixed_config_exhausts_budget() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff(
            "sink_attach",
            RetryConfig::fixed(4, Duration::from_millis(1)),
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::sink_not_ready("remote-default-video"))
            },
        )
        .await;

        assert!(matches!(result, Err(ClientError::SinkNotReady { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_with_timeout_elapses() {
        let result: ClientResult<()> = with_timeout(
            "never_finishes",
            Duration::from_millis(20),
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            },
        )
        .await;

        assert!(matches!(
            result,
            Err(ClientError::OperationTimeout { duration_ms: 20 })
        ));
    }
}
