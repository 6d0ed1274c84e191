pub mod api;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod retry;
pub mod store;

pub use api::{ApiServer, QueryFacade};
pub use blockchain::{PassOutcome, RpcClient, Tracker, TrackerState};
pub use config::{ApiConfig, AppConfig, BlockSelector, LoggingConfig, RpcConfig, TrackerConfig};
pub use error::{ApiError, ConfigError, Result, RpcError, TrackerError};
pub use logging::{ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
pub use models::{Block, Transaction};
pub use retry::{RetryConfig, RetryManager};
pub use store::Store;
