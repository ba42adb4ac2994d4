//! Error types for cube-text-encoder.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
///
/// Unknown words and characters are not represented here: they resolve to
/// the vocabulary's `<UNK>` id instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Candle tensor/model error (shape and dtype mismatches surface here).
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),

    /// Invalid hyperparameters.
    #[error("config: {0}")]
    Config(String),

    /// Vocabulary is missing a reserved entry.
    #[error("vocabulary: {0}")]
    Vocabulary(String),

    /// Unknown or unavailable compute device.
    #[error("device: {0}")]
    Device(String),

    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
