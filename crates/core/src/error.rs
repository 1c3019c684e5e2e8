use std::path::PathBuf;

/// Result alias that carries the crate-wide [`EngineError`] type.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Common error type for the analysis engine.
///
/// Only two situations are fatal to a caller-visible unit of work: a shot
/// that cannot be decoded ([`EngineError::ImageLoad`]) and an export call that
/// cannot complete ([`EngineError::Export`]). Extractors that find nothing
/// return empty collections instead of an error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The image at `path` is missing, unreadable or corrupt.
    #[error("failed to load image `{}`: {reason}", path.display())]
    ImageLoad { path: PathBuf, reason: String },
    /// An export call failed.
    #[error(transparent)]
    Export(#[from] ExportError),
    /// Caller supplied input the engine cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The frequency transform rejected its buffers.
    #[error("fft error: {0}")]
    Fft(String),
    /// The bounded worker pool could not be built.
    #[error("worker pool error: {0}")]
    WorkerPool(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON errors raised while reading configuration.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn image_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ImageLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    /// Returns `true` when the error only concerns a single shot.
    pub fn is_shot_local(&self) -> bool {
        matches!(self, Self::ImageLoad { .. })
    }
}

/// Errors raised by the exporters. Fatal to the export call only.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("unsupported export format `{0}` (expected json, csv or edl)")]
    UnsupportedFormat(String),
    #[error("{artifact} cannot be exported as {format}")]
    UnsupportedArtifact {
        format: &'static str,
        artifact: &'static str,
    },
    #[error("cannot write export to `{}`: {source}", path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization failed: {0}")]
    Serialize(String),
}

impl From<serde_json::Error> for ExportError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialize(value.to_string())
    }
}

impl From<csv::Error> for ExportError {
    fn from(value: csv::Error) -> Self {
        Self::Serialize(value.to_string())
    }
}
