use thiserror::Error;

/// Errors that terminate a batch. Per-target failures never show up here: they
/// are recorded in the target's own `ProbeResult`.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Malformed or mismatched input, rejected before any probing starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// The result sink failed to persist a result; remaining work is aborted.
    #[error("output error: {0}")]
    Output(#[source] std::io::Error),

    #[error("output error: failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("output error: failed to encode row: {0}")]
    Csv(#[from] csv::Error),
}

impl ScanError {
    pub fn config(msg: impl Into<String>) -> Self {
        ScanError::Config(msg.into())
    }

    /// Whether the error was raised before any network I/O took place.
    pub fn is_config(&self) -> bool {
        matches!(self, ScanError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
