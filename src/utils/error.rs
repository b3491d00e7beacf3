use std::sync::Arc;
use thiserror::Error;

/// Boxed error accepted from user functions and sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type SharedError = Arc<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug, Clone)]
pub enum ChainError {
    #[error("Upstream failure: {0}")]
    Upstream(#[source] SharedError),

    #[error("Cannot reduce an empty sequence without a first value")]
    EmptySequence,

    #[error("Element is not iterable: {found}")]
    NonIterableElement { found: String },

    #[error("Missing key: {key}")]
    MissingKey { key: String },

    #[error("Error handler failed: {0}")]
    Handler(#[source] SharedError),

    #[error("IO error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfig { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl ChainError {
    /// Wraps a failure raised while advancing the pipeline.
    ///
    /// A `ChainError` passed through here keeps its own kind, so sources that
    /// already speak `ChainError` are not double wrapped.
    pub fn upstream<E: Into<BoxError>>(err: E) -> Self {
        let boxed: BoxError = err.into();
        match boxed.downcast::<ChainError>() {
            Ok(inner) => *inner,
            Err(other) => ChainError::Upstream(Arc::from(other)),
        }
    }

    pub fn handler(err: anyhow::Error) -> Self {
        ChainError::Handler(Arc::from(BoxError::from(err)))
    }

    pub fn missing_key(key: &str) -> Self {
        ChainError::MissingKey {
            key: key.to_string(),
        }
    }

    pub fn config<M: Into<String>>(message: M) -> Self {
        ChainError::Config {
            message: message.into(),
        }
    }

    /// Only upstream failures may be absorbed by an installed error handler.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ChainError::Upstream(_))
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
