//! Error types for Gator.

use thiserror::Error;

/// Common error type for Gator.
#[derive(Error, Debug)]
pub enum GatorError {
    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant unless a caller
    /// maps a specific failure (such as a unique violation) first.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Resource already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Network failure while fetching a feed (connection, status, timeout, cancellation).
    #[error("network error: {0}")]
    Network(String),

    /// The fetched body is not a decodable syndication document.
    #[error("malformed feed document: {0}")]
    MalformedDocument(String),

    /// There are no feeds to ingest.
    #[error("no feeds available")]
    NoFeedsAvailable,

    /// The command name is not registered.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The command requires a logged-in user.
    #[error("no user logged in, please log in first")]
    NotAuthenticated,

    /// A duration string could not be used as a scheduler interval.
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}

impl GatorError {
    /// Whether the error aborts only the current feed fetch and leaves the feed eligible.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, GatorError::Network(_) | GatorError::MalformedDocument(_))
    }
}

// Conversion from sqlx errors
impl From<sqlx::Error> for GatorError {
    fn from(e: sqlx::Error) -> Self {
        GatorError::Database(e.to_string())
    }
}

impl From<toml::de::Error> for GatorError {
    fn from(e: toml::de::Error) -> Self {
        GatorError::Config(format!("config parse error: {e}"))
    }
}

impl From<toml::ser::Error> for GatorError {
    fn from(e: toml::ser::Error) -> Self {
        GatorError::Config(format!("config serialize error: {e}"))
    }
}

/// Returns true if the sqlx error is a unique constraint violation.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

/// Result type alias for Gator operations.
pub type Result<T> = std::result::Result<T, GatorError>;
