//! API module for the import endpoints
//!
//! Holds the request/response shapes exchanged with the catalog backend.
//!
//! # Design Principle
//!
//! This module contains ONLY:
//! - Plain data types with serde derives
//! - Pure helpers on those types
//!
//! The HTTP transport lives in `cosdb-import`.

pub mod types;

pub use types::{
    ApiErrorBody, ImportJob, ImportKind, JobStatus, RowIssue, StartImportResponse,
    VerifyKeyRequest, VerifyKeyResponse,
};
