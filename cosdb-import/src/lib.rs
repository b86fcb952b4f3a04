//! cosdb-import library interface
//!
//! Key-gated spreadsheet import for the cosdb catalog backend: verify an
//! upload key, submit a file, and follow the server-side job until it
//! succeeds or fails.

pub mod client;
pub mod display;
pub mod error;
pub mod gate;
pub mod page;
pub mod poller;
pub mod store;
pub mod submission;
pub mod template;

pub use crate::client::{HttpImportClient, ImportApi, ImportRequest};
pub use crate::error::{ErrorCategory, ImportError, ImportResult};
pub use crate::page::{ImportPage, PageContext, PageSettings};
pub use crate::store::{ImportState, Step};
pub use crate::submission::SelectedFile;
