use thiserror::Error;

/// Errors surfaced by the neck. None of them are recoverable inside the
/// module: construction fails, or the whole forward pass is aborted.
#[derive(Debug, Error)]
pub enum FpnError {
    /// Channel triples of the wrong length or with a zero entry.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Batch or spatial dims that do not line up at an operator.
    #[error("Shape mismatch in {op}: {detail}")]
    ShapeMismatch { op: &'static str, detail: String },

    /// A tensor whose channel count disagrees with the configured width.
    #[error("Channel mismatch for {scale} input: expected {expected}, got {actual}")]
    ChannelMismatch {
        scale: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Record error: {0}")]
    Record(String),
}

pub type Result<T> = std::result::Result<T, FpnError>;
