//! Template downloader
//!
//! Fetches the import template through the key-gated channel and saves it as
//! `<kind>_import_template.xlsx`. No retry and no tracking.

use cosdb_common::api::ImportKind;
use cosdb_common::events::ImportEvent;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{ImportError, ImportResult};
use crate::page::PageContext;

/// Download the template for `kind` into `dir`; returns the saved path
pub async fn download(ctx: &PageContext, kind: ImportKind, dir: &Path) -> ImportResult<PathBuf> {
    let credential = {
        let state = ctx.state.read().await;
        if !state.has_credential() {
            return Err(ImportError::MissingUploadKey);
        }
        state.upload_key.clone()
    };

    let bytes = ctx.api.download_template(kind, &credential).await?;

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(kind.template_file_name());
    tokio::fs::write(&path, &bytes).await?;

    info!(kind = %kind, bytes = bytes.len(), path = %path.display(), "Template saved");
    ctx.events
        .emit_lossy(ImportEvent::TemplateSaved { path: path.clone() });

    Ok(path)
}
