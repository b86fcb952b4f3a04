//! Import key gate
//!
//! Exchanges the shared upload secret for an import credential. Blank input
//! never reaches the network, and only one verification may be in flight.

use chrono::Utc;
use cosdb_common::events::ImportEvent;
use tracing::{debug, info, warn};

use crate::error::{ImportError, ImportResult};
use crate::page::PageContext;

const DEFAULT_REJECTION: &str = "invalid upload key";

/// Verify `candidate`; returns `true` when the page moved to the upload step
pub async fn verify(ctx: &PageContext, candidate: &str) -> ImportResult<bool> {
    let key = candidate.trim();
    if key.is_empty() {
        return Err(ImportError::EmptyKey);
    }

    ctx.state.write().await.begin_verify()?;

    let response = match ctx.api.verify_key(key).await {
        Ok(response) => response,
        Err(e) => {
            ctx.state.write().await.finish_verify_failure();
            return Err(e);
        }
    };

    if !response.valid {
        ctx.state.write().await.finish_verify_failure();
        let message = response
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REJECTION.to_string());
        warn!(%message, "Upload key rejected");
        ctx.events.emit_lossy(ImportEvent::KeyRejected {
            message: message.clone(),
        });
        return Err(ImportError::KeyRejected(message));
    }

    // Without an issued token the verified key itself is the credential
    let credential = response
        .token
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| key.to_string());

    let entered_upload = ctx.state.write().await.finish_verify_success(credential);
    if entered_upload {
        info!("Upload key accepted");
        ctx.events.emit_lossy(ImportEvent::KeyAccepted {
            timestamp: Utc::now(),
        });
    } else {
        debug!("Upload key re-verified; already on upload step");
    }

    Ok(entered_upload)
}
