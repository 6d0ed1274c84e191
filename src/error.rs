use thiserror::Error;

/// Main error type for the transaction tracker
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

/// Failures of a single block fetch against the remote node
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    /// Connection error, timeout, non-success HTTP status or a body that is
    /// not a JSON-RPC envelope.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error object.
    #[error("Remote RPC error: code={code}, message={message}")]
    Remote { code: i64, message: String },

    /// The envelope was fine but the block payload could not be decoded.
    #[error("Decode failure: {0}")]
    Decode(String),
}

impl RpcError {
    /// Only transport failures are worth retrying within a pass
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RpcError::Transport(_))
    }

    /// Short label used in structured log entries
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::Transport(_) => "transport_failure",
            RpcError::Remote { .. } => "remote_rpc_error",
            RpcError::Decode(_) => "decode_failure",
        }
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RpcError::Transport(format!("request timed out: {}", err))
        } else if err.is_connect() {
            RpcError::Transport(format!("connection failed: {}", err))
        } else {
            RpcError::Transport(err.to_string())
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration parsing failed: {0}")]
    Parsing(String),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
}

/// HTTP server errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Server error: {0}")]
    Server(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// The process cannot continue
    Critical,
    /// A pass failed and will not be retried
    High,
    /// A pass failed on a transient condition
    Medium,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Critical => "critical",
            ErrorSeverity::High => "high",
            ErrorSeverity::Medium => "medium",
        }
    }
}

impl TrackerError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TrackerError::Config(_) => ErrorSeverity::Critical,
            TrackerError::Api(_) => ErrorSeverity::Critical,
            TrackerError::Rpc(e) if e.is_recoverable() => ErrorSeverity::Medium,
            TrackerError::Rpc(_) => ErrorSeverity::High,
        }
    }
}
