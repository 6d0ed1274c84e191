use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::RpcConfig;
use crate::error::RpcError;
use crate::logging::{ErrorLogger, LogContext, PerformanceMonitor};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn from_rpc_config(config: &RpcConfig) -> Self {
        Self {
            max_attempts: config.max_retries.saturating_add(1),
            initial_delay: Duration::from_secs(config.retry_delay_seconds),
            max_delay: Duration::from_secs(config.max_retry_delay_seconds),
            ..Self::default()
        }
    }

    /// A single attempt, no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Retries recoverable RPC failures with exponential backoff and jitter
pub struct RetryManager {
    config: RetryConfig,
    operation_name: String,
}

impl RetryManager {
    pub fn new(operation_name: &str, config: RetryConfig) -> Self {
        Self {
            config,
            operation_name: operation_name.to_string(),
        }
    }

    /// Run `operation` until it succeeds, fails with a non-recoverable error,
    /// runs out of attempts, or `cancel` fires during a backoff sleep.
    ///
    /// An attempt that is already running is never interrupted.
    pub async fn execute<T, F, Fut>(&self, cancel: &CancellationToken, operation: F) -> Result<T, RpcError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let monitor = PerformanceMonitor::new(&format!("retry_{}", self.operation_name));
        let mut attempt = 1;

        loop {
            let error = match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        ErrorLogger::log_recovery_success(&self.operation_name, attempt, monitor.elapsed_ms());
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            if !error.is_recoverable() || attempt >= self.config.max_attempts {
                return Err(error);
            }

            ErrorLogger::log_retry_attempt(&self.operation_name, &error, attempt, self.config.max_attempts);

            let delay = self.calculate_delay(attempt);
            LogContext::new("retry", &self.operation_name)
                .with_retry_count(attempt)
                .with_metadata("delay_ms", serde_json::json!(delay.as_millis() as u64))
                .debug(&format!("Retrying in {}ms", delay.as_millis()));

            tokio::select! {
                _ = cancel.cancelled() => {
                    LogContext::new("retry", &self.operation_name)
                        .with_retry_count(attempt)
                        .info("Cancelled while waiting to retry");
                    return Err(error);
                }
                _ = sleep(delay) => {}
            }

            attempt += 1;
        }
    }

    /// Delay before the attempt following `attempt`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay.as_secs_f64();
        let exponential_delay = base_delay * self.config.backoff_multiplier.powi(attempt as i32 - 1);

        let capped_delay = exponential_delay.min(self.config.max_delay.as_secs_f64());

        let final_delay = if self.config.jitter {
            let jitter_factor = 0.1;
            let jitter = capped_delay * jitter_factor * (rand::random::<f64>() - 0.5);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}
