//! Job status poller
//!
//! A cancellable task that sleeps one interval, issues a single status
//! request, applies the response, and reschedules. Requests therefore never
//! overlap. Each request is tagged with a sequence number so a late response
//! cannot overwrite a newer one. The loop ends on a terminal status, when the
//! task stops being the current one, or on cancellation.

use cosdb_common::events::ImportEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::page::PageContext;
use crate::store::PollOutcome;

/// Handle to a running poll loop
///
/// Dropping the handle cancels the loop.
pub struct JobPoller {
    task_id: String,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl JobPoller {
    /// Start polling `task_id`
    pub fn spawn(ctx: PageContext, task_id: String) -> Self {
        let cancel = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(true));

        debug!(task_id = %task_id, interval = ?ctx.settings.poll_interval, "Starting poller");
        ctx.events.emit_lossy(ImportEvent::PollingStarted {
            task_id: task_id.clone(),
        });

        let handle = tokio::spawn(poll_loop(
            ctx,
            task_id.clone(),
            cancel.clone(),
            Arc::clone(&running),
        ));

        Self {
            task_id,
            cancel,
            running,
            handle,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Loop has not exited, has not been cancelled, and has not panicked
    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && !self.cancel.is_cancelled()
            && !self.handle.is_finished()
    }

    /// Cancel and wait for the loop to exit
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.handle).await {
            warn!(task_id = %self.task_id, "Poller task ended abnormally: {}", e);
        }
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop(
    ctx: PageContext,
    task_id: String,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(ctx.settings.poll_interval) => {}
        }

        let (seq, credential) = {
            let mut state = ctx.state.write().await;
            (state.issue_poll_seq(), state.upload_key.clone())
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = ctx.api.fetch_status(&task_id, &credential) => result,
        };

        let job = match result {
            Ok(job) => job,
            Err(e) => {
                // The next tick is the retry
                warn!(task_id = %task_id, seq, "Status fetch failed: {}", e);
                ctx.notify_error(&e).await;
                continue;
            }
        };

        let (outcome, mirrored) = {
            let mut state = ctx.state.write().await;
            let outcome = state.apply_poll(seq, &task_id, job);
            (outcome, state.current_task.clone())
        };

        match (outcome, mirrored) {
            (PollOutcome::Applied { terminal }, Some(job)) => {
                debug!(
                    task_id = %task_id,
                    seq,
                    status = %job.status,
                    success = job.success_count,
                    errors = job.error_count,
                    total = job.total_records,
                    "Job status updated"
                );
                ctx.events.emit_lossy(ImportEvent::JobUpdated { job: job.clone() });
                if terminal {
                    info!(
                        task_id = %task_id,
                        status = %job.status,
                        success = job.success_count,
                        errors = job.error_count,
                        "Import job finished"
                    );
                    ctx.events.emit_lossy(ImportEvent::JobFinished { job });
                    break;
                }
            }
            (PollOutcome::Stale, _) => {
                debug!(task_id = %task_id, seq, "Discarding stale status response");
            }
            _ => {
                debug!(task_id = %task_id, "Task no longer current; stopping poller");
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    debug!(task_id = %task_id, "Poller stopped");
    ctx.events.emit_lossy(ImportEvent::PollingStopped { task_id });
}
