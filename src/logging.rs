use log::{info, warn, error, debug, trace, LevelFilter};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::config::LoggingConfig;
use crate::error::{ErrorSeverity, RpcError, TrackerError};

/// Structured logging context for the tracker
pub struct LogContext {
    pub component: String,
    pub operation: String,
    pub metadata: HashMap<String, Value>,
}

impl LogContext {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_block_number(self, block_number: u64) -> Self {
        self.with_metadata("block_number", json!(block_number))
    }

    pub fn with_transaction_hash(self, tx_hash: &str) -> Self {
        self.with_metadata("transaction_hash", json!(tx_hash))
    }

    pub fn with_address(self, address: &str) -> Self {
        self.with_metadata("address", json!(address))
    }

    pub fn with_duration_ms(self, duration_ms: u64) -> Self {
        self.with_metadata("duration_ms", json!(duration_ms))
    }

    pub fn with_retry_count(self, retry_count: u32) -> Self {
        self.with_metadata("retry_count", json!(retry_count))
    }

    pub fn with_error_kind(self, kind: &str) -> Self {
        self.with_metadata("error_kind", json!(kind))
    }

    fn format_message(&self, level: &str, message: &str) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut log_entry = json!({
            "timestamp": timestamp,
            "level": level,
            "component": self.component,
            "operation": self.operation,
            "message": message,
        });

        for (key, value) in &self.metadata {
            log_entry[key] = value.clone();
        }

        log_entry.to_string()
    }

    pub fn info(&self, message: &str) {
        info!("{}", self.format_message("INFO", message));
    }

    pub fn warn(&self, message: &str) {
        warn!("{}", self.format_message("WARN", message));
    }

    pub fn error(&self, message: &str) {
        error!("{}", self.format_message("ERROR", message));
    }

    pub fn debug(&self, message: &str) {
        debug!("{}", self.format_message("DEBUG", message));
    }

    pub fn trace(&self, message: &str) {
        trace!("{}", self.format_message("TRACE", message));
    }
}

/// Times an operation and logs its duration when finished
pub struct PerformanceMonitor {
    start: Instant,
    operation: String,
}

impl PerformanceMonitor {
    pub fn new(operation: &str) -> Self {
        Self {
            start: Instant::now(),
            operation: operation.to_string(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn finish_with_result<T, E>(self, result: &Result<T, E>) -> u64
    where
        E: std::fmt::Display,
    {
        let duration = self.elapsed_ms();
        let context = LogContext::new("performance", &self.operation).with_duration_ms(duration);

        match result {
            Ok(_) => context.trace(&format!("Operation completed in {}ms", duration)),
            Err(e) => context
                .with_metadata("error", json!(e.to_string()))
                .debug(&format!("Operation failed after {}ms: {}", duration, e)),
        }

        duration
    }
}

/// Error logging utilities
pub struct ErrorLogger;

impl ErrorLogger {
    /// Report a failed indexing pass. Transport failures are expected from time
    /// to time and go out as warnings; anything else is an error.
    pub fn log_pass_failure(error: &RpcError) {
        let context = LogContext::new("tracker", "indexing_pass").with_error_kind(error.kind());

        let message = format!("Indexing pass skipped: {}", error);
        if error.is_recoverable() {
            context.warn(&message);
        } else {
            context.error(&message);
        }
    }

    /// Report an error that ended the process
    pub fn log_fatal(error: &TrackerError) {
        let severity = error.severity();
        let context = LogContext::new("tracker", "startup")
            .with_metadata("severity", json!(severity.as_str()));

        let message = format!("Tracker exiting: {}", error);
        match severity {
            ErrorSeverity::Medium => context.warn(&message),
            ErrorSeverity::Critical | ErrorSeverity::High => context.error(&message),
        }
    }

    pub fn log_retry_attempt(operation: &str, error: &RpcError, attempt: u32, max_attempts: u32) {
        let context = LogContext::new("retry", operation)
            .with_retry_count(attempt)
            .with_error_kind(error.kind())
            .with_metadata("max_attempts", json!(max_attempts));

        context.warn(&format!("Attempt {} of {} failed: {}", attempt, max_attempts, error));
    }

    pub fn log_recovery_success(operation: &str, attempts: u32, total_duration_ms: u64) {
        let context = LogContext::new("retry", operation)
            .with_retry_count(attempts)
            .with_duration_ms(total_duration_ms);

        context.info(&format!("Operation recovered after {} attempts in {}ms", attempts, total_duration_ms));
    }
}

/// Per-pass and per-call metrics
pub struct MetricsLogger;

impl MetricsLogger {
    pub fn log_block_indexed(block_number: u64, transaction_count: usize, matched: usize, duration_ms: u64) {
        let context = LogContext::new("metrics", "block_indexed")
            .with_block_number(block_number)
            .with_metadata("transaction_count", json!(transaction_count))
            .with_metadata("matched_transactions", json!(matched))
            .with_duration_ms(duration_ms);

        context.info(&format!(
            "Block {} indexed: {} transactions, {} matched subscribers",
            block_number, transaction_count, matched
        ));
    }

    pub fn log_rpc_call(method: &str, duration_ms: u64, success: bool) {
        let context = LogContext::new("metrics", "rpc_call")
            .with_metadata("method", json!(method))
            .with_duration_ms(duration_ms)
            .with_metadata("success", json!(success));

        if success {
            context.debug(&format!("RPC call {} completed in {}ms", method, duration_ms));
        } else {
            context.warn(&format!("RPC call {} failed after {}ms", method, duration_ms));
        }
    }
}

fn parse_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}

/// Initialize env_logger from configuration. `RUST_LOG`, when set, still wins.
pub fn init_logging(config: &LoggingConfig) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(parse_level(&config.level));
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    if config.format == "json" {
        // Structured entries are already JSON; wrap plain ones so every line parses.
        builder.format(|buf, record| {
            use std::io::Write;

            let line = record.args().to_string();
            if serde_json::from_str::<Value>(&line).is_ok() {
                writeln!(buf, "{}", line)
            } else {
                let entry = json!({
                    "timestamp": chrono::Utc::now().timestamp(),
                    "level": record.level().to_string(),
                    "component": record.target(),
                    "message": line,
                });
                writeln!(buf, "{}", entry)
            }
        });
    } else {
        builder.format(|buf, record| {
            use std::io::Write;

            writeln!(
                buf,
                "{} [{}] {}: {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        });
    }

    // A second init (e.g. from tests) keeps the first logger.
    let _ = builder.try_init();
    info!("Logging initialized (level={}, format={})", config.level, config.format);
}
