//! Error types for the wallpaper-dl library.

use thiserror::Error;

/// Errors that can occur while browsing or downloading wallpapers.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level HTTP failure (connection refused, timeout, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("{url} returned {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// Status code received.
        status: reqwest::StatusCode,
    },

    /// A response body or record did not have the expected shape.
    #[error("Malformed response: {0}")]
    Decode(String),

    /// The backend refused a login, registration or upload.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// A wallpaper could not be fetched while building an archive.
    #[error("Failed to fetch wallpaper {position} ({url}): {reason}")]
    Fetch {
        /// 1-based position of the image in the request.
        position: usize,
        /// URL that failed.
        url: String,
        /// Underlying failure.
        reason: String,
    },

    /// A bulk download had no payloads to put in the archive.
    #[error("Nothing to archive for category {category}")]
    NothingToArchive {
        /// Category that was being archived.
        category: String,
    },

    /// A bulk download is already running for this downloader.
    #[error("A bulk download is already in progress")]
    JobInProgress,

    /// Building the zip container failed.
    #[error("Archive assembly failed: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Form input failed local validation; nothing was sent.
    #[error("{field}: {message}")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable explanation.
        message: String,
    },

    /// File already exists and force overwrite is disabled.
    #[error("File already exists: {path}")]
    FileExists {
        /// Path to the existing file.
        path: String,
    },

    /// System clipboard access failed.
    #[error("Clipboard error: {0}")]
    Clipboard(String),

    /// Configuration could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization of persisted values failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The operation was cancelled before it finished.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Shorthand for a [`Error::Validation`] value.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

/// A specialized `Result` type for wallpaper-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
