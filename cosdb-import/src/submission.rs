//! Import submission
//!
//! Validates the selected spreadsheet, then uploads it together with the
//! import kind, validate-only flag and credential.

use cosdb_common::api::ImportKind;
use cosdb_common::events::ImportEvent;
use std::path::Path;
use tracing::info;

use crate::client::ImportRequest;
use crate::error::{ImportError, ImportResult};
use crate::page::PageContext;

/// Largest file the backend accepts
pub const MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Spreadsheet extensions the backend can parse
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["csv", "xlsx", "xls"];

/// A spreadsheet chosen for upload, already checked for type and size
#[derive(Debug, Clone)]
pub struct SelectedFile {
    name: String,
    contents: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, contents: Vec<u8>) -> ImportResult<Self> {
        let name = name.into();
        check_extension(&name)?;
        check_size(contents.len() as u64)?;
        Ok(Self { name, contents })
    }

    /// Read a file from disk; size is checked before the contents are loaded
    pub async fn open(path: &Path) -> ImportResult<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or(ImportError::NoFileSelected)?;
        check_extension(&name)?;

        let metadata = tokio::fs::metadata(path).await?;
        check_size(metadata.len())?;

        let contents = tokio::fs::read(path).await?;
        Self::new(name, contents)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.contents.len() as u64
    }

    /// Size in megabytes with two decimals, e.g. `1.25 MB`
    pub fn size_label(&self) -> String {
        format!("{:.2} MB", self.size() as f64 / 1024.0 / 1024.0)
    }
}

fn check_extension(name: &str) -> ImportResult<()> {
    let accepted = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ACCEPTED_EXTENSIONS
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        });
    if accepted {
        Ok(())
    } else {
        Err(ImportError::UnsupportedFile(name.to_string()))
    }
}

fn check_size(size: u64) -> ImportResult<()> {
    if size > MAX_FILE_BYTES {
        return Err(ImportError::FileTooLarge {
            size,
            limit: MAX_FILE_BYTES,
        });
    }
    Ok(())
}

/// Submit `file`; returns the new task id
///
/// Rejected locally, with no request issued, when no file is selected or no
/// credential is held. A failed upload leaves the previous job mirror as is.
pub async fn submit(
    ctx: &PageContext,
    file: Option<&SelectedFile>,
    kind: ImportKind,
    validate_only: bool,
) -> ImportResult<String> {
    let file = file.ok_or(ImportError::NoFileSelected)?;

    let upload_key = {
        let mut state = ctx.state.write().await;
        if !state.has_credential() {
            return Err(ImportError::MissingUploadKey);
        }
        state.begin_upload()?;
        state.upload_key.clone()
    };

    let request = ImportRequest {
        file_name: file.name.clone(),
        contents: file.contents.clone(),
        kind,
        validate_only,
        upload_key,
    };

    let task_id = match ctx.api.start_import(request).await {
        Ok(response) if !response.task_id.trim().is_empty() => response.task_id,
        Ok(_) => {
            ctx.state.write().await.finish_upload_failure();
            return Err(ImportError::Decode("response carried no task_id".to_string()));
        }
        Err(e) => {
            ctx.state.write().await.finish_upload_failure();
            return Err(e);
        }
    };

    ctx.state
        .write()
        .await
        .finish_upload_success(task_id.clone(), kind);

    info!(
        task_id = %task_id,
        file = %file.name,
        kind = %kind,
        validate_only,
        "Import submitted"
    );
    ctx.events.emit_lossy(ImportEvent::JobSubmitted {
        task_id: task_id.clone(),
        validate_only,
    });

    Ok(task_id)
}
