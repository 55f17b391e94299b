use thiserror::Error;

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors that can occur during driver operations
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    #[error("Invalid offset {offset} for path {path}")]
    InvalidOffset { path: String, offset: u64 },

    #[error("Upload session not found: {upload_id}")]
    UploadNotFound { upload_id: String },

    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    #[error("No driver registered under name: {name}")]
    UnknownDriver { name: String },

    #[error("Storage transport error: {source}")]
    Transport {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl DriverError {
    /// Create a transport error from any error type
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            source: Box::new(error),
        }
    }

    /// Create a path not found error
    pub fn not_found<S: Into<String>>(path: S) -> Self {
        Self::PathNotFound { path: path.into() }
    }

    /// Create an invalid offset error
    pub fn invalid_offset<S: Into<String>>(path: S, offset: u64) -> Self {
        Self::InvalidOffset {
            path: path.into(),
            offset,
        }
    }

    /// Create an upload not found error
    pub fn upload_not_found<S: Into<String>>(upload_id: S) -> Self {
        Self::UploadNotFound {
            upload_id: upload_id.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter<S: Into<String>>(message: S) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PathNotFound { .. })
    }
}
