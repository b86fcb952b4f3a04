//! Error types for cosdb-import
//!
//! Every failure falls into one of four categories. Validation errors are
//! raised before any network call; the rest come back from the backend or
//! the transport. Per-row import errors are job data, not `ImportError`s.

use thiserror::Error;

/// Failure category, used to pick the user-facing wording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caught locally, no request issued
    Validation,
    /// Key rejected or credential not accepted
    Auth,
    /// Network failure, timeout, or undecodable response
    Transport,
    /// Backend refused the request for another reason
    Rejected,
}

/// Import workflow error type
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("upload key is empty")]
    EmptyKey,

    #[error("no file selected")]
    NoFileSelected,

    #[error("upload key missing")]
    MissingUploadKey,

    #[error("unsupported file type: {0} (expected .csv, .xlsx or .xls)")]
    UnsupportedFile(String),

    #[error("file too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("key verification already in progress")]
    VerifyInFlight,

    #[error("upload already in progress")]
    UploadInFlight,

    /// Backend answered `valid: false`
    #[error("upload key rejected: {0}")]
    KeyRejected(String),

    /// HTTP 401 / 403
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// Any other non-success HTTP status
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Common error: {0}")]
    Common(#[from] cosdb_common::Error),
}

impl ImportError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ImportError::EmptyKey
            | ImportError::NoFileSelected
            | ImportError::MissingUploadKey
            | ImportError::UnsupportedFile(_)
            | ImportError::FileTooLarge { .. }
            | ImportError::VerifyInFlight
            | ImportError::UploadInFlight
            | ImportError::Io(_)
            | ImportError::Common(_) => ErrorCategory::Validation,
            ImportError::KeyRejected(_) | ImportError::Unauthorized(_) => ErrorCategory::Auth,
            ImportError::Network(_) | ImportError::Decode(_) => ErrorCategory::Transport,
            ImportError::Rejected { .. } => ErrorCategory::Rejected,
        }
    }

    /// Text shown in the transient notice
    ///
    /// Transport details go to the log only; the user sees a generic message.
    pub fn user_message(&self) -> String {
        match self.category() {
            ErrorCategory::Transport => "network error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<reqwest::Error> for ImportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ImportError::Decode(err.to_string())
        } else {
            ImportError::Network(err.to_string())
        }
    }
}

/// Result type for import operations
pub type ImportResult<T> = Result<T, ImportError>;
