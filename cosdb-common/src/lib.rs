//! # cosdb Common Library
//!
//! Shared code for the cosdb import tooling including:
//! - Wire types for the import endpoints (jobs, statuses, key verification)
//! - Configuration loading
//! - The import event bus
//! - The common error type

pub mod api;
pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
