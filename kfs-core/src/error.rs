//! Error types for kfs

use thiserror::Error;

/// Result type alias
pub type KfsResult<T> = Result<T, KfsError>;

/// Main error type
#[derive(Error, Debug)]
pub enum KfsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("closed: {0}")]
    Closed(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl KfsError {
    /// Wrap a remote failure, keeping the underlying cause.
    pub fn transport(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        KfsError::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// A remote failure described only by a message, e.g. an HTTP status line.
    pub fn transport_message(message: impl Into<String>) -> Self {
        KfsError::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, KfsError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, KfsError::AlreadyExists(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, KfsError::Closed(_))
    }
}
