//! Import page
//!
//! Owns the page-scoped [`ImportState`] and the poller handle, and exposes the
//! user actions. Every action converts failures into a transient notice
//! before returning them, so the page never ends up half-updated. After each
//! change to the job mirror the poller is re-evaluated: it runs exactly while
//! a credential is held and the mirrored job is queued or running.

use cosdb_common::api::{ImportJob, ImportKind};
use cosdb_common::config::ClientConfig;
use cosdb_common::events::{EventBus, ImportEvent, NoticeLevel};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};

use crate::client::ImportApi;
use crate::error::{ImportError, ImportResult};
use crate::poller::JobPoller;
use crate::store::{ImportState, Notice};
use crate::submission::SelectedFile;
use crate::{gate, submission, template};

/// Timing and filesystem settings for one page
#[derive(Debug, Clone)]
pub struct PageSettings {
    pub poll_interval: Duration,
    pub notice_ttl: Duration,
    pub download_dir: PathBuf,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for PageSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            notice_ttl: config.notice_ttl,
            download_dir: config.download_dir.clone(),
        }
    }
}

/// Everything the components share; cloned into the poller task
#[derive(Clone)]
pub struct PageContext {
    pub api: Arc<dyn ImportApi>,
    pub state: Arc<RwLock<ImportState>>,
    pub events: EventBus,
    pub settings: PageSettings,
}

impl PageContext {
    pub(crate) async fn notify(&self, level: NoticeLevel, text: impl Into<String>) {
        let text = text.into();
        self.state.write().await.set_notice(level, text.clone());
        self.events.emit_lossy(ImportEvent::Notice { level, text });
    }

    pub(crate) async fn notify_error(&self, err: &ImportError) {
        self.notify(NoticeLevel::Error, err.user_message()).await;
    }
}

/// One import page instance
///
/// Dropping the page cancels its poller.
pub struct ImportPage {
    ctx: PageContext,
    poller: Mutex<Option<JobPoller>>,
}

impl ImportPage {
    pub fn new(api: Arc<dyn ImportApi>, settings: PageSettings) -> Self {
        Self::with_events(api, settings, EventBus::default())
    }

    pub fn with_events(api: Arc<dyn ImportApi>, settings: PageSettings, events: EventBus) -> Self {
        Self {
            ctx: PageContext {
                api,
                state: Arc::new(RwLock::new(ImportState::new())),
                events,
                settings,
            },
            poller: Mutex::new(None),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.ctx.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ImportEvent> {
        self.ctx.events.subscribe()
    }

    pub fn settings(&self) -> &PageSettings {
        &self.ctx.settings
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> ImportState {
        self.ctx.state.read().await.clone()
    }

    pub async fn current_task(&self) -> Option<ImportJob> {
        self.ctx.state.read().await.current_task.clone()
    }

    /// Notice still within its display window
    pub async fn visible_notice(&self) -> Option<Notice> {
        self.ctx
            .state
            .read()
            .await
            .visible_notice(Instant::now(), self.ctx.settings.notice_ttl)
            .cloned()
    }

    pub async fn dismiss_notice(&self) {
        self.ctx.state.write().await.clear_notice();
    }

    pub async fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .await
            .as_ref()
            .is_some_and(JobPoller::is_active)
    }

    // ========================================
    // User Actions
    // ========================================

    /// Verify an upload key; `Ok(true)` when the upload step was entered
    pub async fn verify_key(&self, key: &str) -> ImportResult<bool> {
        let result = gate::verify(&self.ctx, key).await;
        if let Ok(true) = result {
            self.ctx.notify(NoticeLevel::Success, "upload key verified").await;
        }
        self.surface(result).await
    }

    /// Upload a file; returns the task id and starts polling it
    pub async fn submit(
        &self,
        file: Option<&SelectedFile>,
        kind: ImportKind,
        validate_only: bool,
    ) -> ImportResult<String> {
        let result = submission::submit(&self.ctx, file, kind, validate_only).await;
        if result.is_ok() {
            self.sync_poller().await;
        }
        self.surface(result).await
    }

    /// Replace the mirror by hand (e.g. with a status fetched elsewhere)
    ///
    /// `JobFinished` is emitted only when this update moves the job into a
    /// terminal status.
    pub async fn update_task(&self, job: ImportJob) {
        let finished_now = {
            let mut state = self.ctx.state.write().await;
            let was_terminal = state
                .current_task
                .as_ref()
                .is_some_and(|current| current.task_id == job.task_id && current.is_terminal());
            state.replace_task(job.clone());
            job.is_terminal() && !was_terminal
        };

        self.ctx.events.emit_lossy(ImportEvent::JobUpdated { job: job.clone() });
        if finished_now {
            self.ctx.events.emit_lossy(ImportEvent::JobFinished { job });
        }
        self.sync_poller().await;
    }

    /// Save the template for `kind` into the configured download directory
    pub async fn download_template(&self, kind: ImportKind) -> ImportResult<PathBuf> {
        let dir = self.ctx.settings.download_dir.clone();
        self.download_template_to(kind, &dir).await
    }

    pub async fn download_template_to(&self, kind: ImportKind, dir: &Path) -> ImportResult<PathBuf> {
        let result = template::download(&self.ctx, kind, dir).await;
        if let Ok(path) = &result {
            self.ctx
                .notify(NoticeLevel::Success, format!("template saved to {}", path.display()))
                .await;
        }
        self.surface(result).await
    }

    /// Forget the current job and stop polling it
    pub async fn clear_current_task(&self) {
        self.ctx.state.write().await.clear_current_task();
        self.sync_poller().await;
    }

    /// Drop the credential and return to the gate
    pub async fn reset_key_validation(&self) {
        self.ctx.state.write().await.reset_key_validation();
        self.sync_poller().await;
    }

    /// Return the page to its initial state
    pub async fn reset(&self) {
        {
            let mut state = self.ctx.state.write().await;
            state.reset_key_validation();
            state.clear_current_task();
        }
        self.sync_poller().await;
        info!("Import page reset");
        self.ctx.events.emit_lossy(ImportEvent::Reset);
    }

    /// Wait until the mirrored job is terminal or polling stops
    ///
    /// Returns the mirror at that point, or `None` when no job is held.
    pub async fn wait_for_terminal(&self) -> Option<ImportJob> {
        let mut rx = self.subscribe();

        loop {
            {
                let state = self.ctx.state.read().await;
                match &state.current_task {
                    None => return None,
                    Some(job) if job.is_terminal() => return Some(job.clone()),
                    Some(_) => {}
                }
            }
            if !self.is_polling().await {
                return self.current_task().await;
            }

            // Re-check once per interval in case the poller died without an event
            let received =
                match tokio::time::timeout(self.ctx.settings.poll_interval, rx.recv()).await {
                    Ok(received) => received,
                    Err(_) => continue,
                };

            match received {
                Ok(ImportEvent::PollingStopped { task_id }) => {
                    let current = self.current_task().await;
                    if current.as_ref().map_or(true, |job| job.task_id == task_id) {
                        return current;
                    }
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return self.current_task().await,
            }
        }
    }

    /// Tear down the poller (page unmount)
    pub async fn shutdown(&self) {
        if let Some(poller) = self.poller.lock().await.take() {
            poller.stop().await;
        }
    }

    // ========================================
    // Internals
    // ========================================

    /// Turn a failure into a notice, then hand it back
    async fn surface<T>(&self, result: ImportResult<T>) -> ImportResult<T> {
        if let Err(e) = &result {
            warn!(category = ?e.category(), "Import action failed: {}", e);
            self.ctx.notify_error(e).await;
        }
        result
    }

    /// Start, keep, or stop the poller to match the mirror
    async fn sync_poller(&self) {
        let wanted = {
            let state = self.ctx.state.read().await;
            if state.has_credential() && state.needs_polling() {
                state.current_task.as_ref().map(|job| job.task_id.clone())
            } else {
                None
            }
        };

        let mut slot = self.poller.lock().await;
        let keep = match (slot.as_ref(), wanted.as_deref()) {
            (Some(poller), Some(task_id)) => poller.task_id() == task_id && poller.is_active(),
            _ => false,
        };
        if keep {
            return;
        }

        if let Some(old) = slot.take() {
            old.stop().await;
        }
        if let Some(task_id) = wanted {
            *slot = Some(JobPoller::spawn(self.ctx.clone(), task_id));
        }
    }
}
