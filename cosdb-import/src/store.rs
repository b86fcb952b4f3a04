//! Page-scoped import state
//!
//! One [`ImportState`] belongs to one import page. All transitions are
//! synchronous methods; the page takes the lock, applies a transition,
//! releases the lock, and only then awaits the network.

use cosdb_common::api::{ImportJob, ImportKind};
use cosdb_common::events::NoticeLevel;
use std::time::{Duration, Instant};

use crate::error::{ImportError, ImportResult};

/// Terminal jobs kept in the page history
pub const HISTORY_LIMIT: usize = 20;

/// Which step of the wizard is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Step {
    /// Waiting for a valid upload key
    #[default]
    Gate,
    /// Key accepted; file selection and job tracking
    Upload,
}

/// Transient user-facing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
    pub shown_at: Instant,
}

impl Notice {
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.shown_at) >= ttl
    }
}

/// Outcome of offering a poll response to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Mirror replaced; `terminal` tells the poller whether to stop
    Applied { terminal: bool },
    /// An equal or newer response was already applied
    Stale,
    /// The task is no longer the current one
    Orphaned,
}

/// Import page state
#[derive(Debug, Clone, Default)]
pub struct ImportState {
    pub step: Step,
    /// Credential issued by the key gate; empty when none is held
    pub upload_key: String,
    pub is_key_valid: bool,
    pub verifying: bool,
    pub uploading: bool,
    pub current_task: Option<ImportJob>,
    /// Terminal jobs, newest first
    pub history: Vec<ImportJob>,
    notice: Option<Notice>,
    poll_seq_issued: u64,
    poll_seq_applied: u64,
}

impl ImportState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A credential is held and usable for import calls
    pub fn has_credential(&self) -> bool {
        self.is_key_valid && !self.upload_key.is_empty()
    }

    // ========================================
    // Key Gate
    // ========================================

    pub fn begin_verify(&mut self) -> ImportResult<()> {
        if self.verifying {
            return Err(ImportError::VerifyInFlight);
        }
        self.verifying = true;
        Ok(())
    }

    /// Store the credential; returns `true` only on the gate → upload transition
    pub fn finish_verify_success(&mut self, credential: String) -> bool {
        self.verifying = false;
        self.upload_key = credential;
        self.is_key_valid = true;

        if self.step == Step::Upload {
            return false;
        }
        self.step = Step::Upload;
        true
    }

    pub fn finish_verify_failure(&mut self) {
        self.verifying = false;
    }

    /// Drop the credential and return to the gate
    pub fn reset_key_validation(&mut self) {
        self.upload_key.clear();
        self.is_key_valid = false;
        self.verifying = false;
        self.step = Step::Gate;
    }

    // ========================================
    // Submission
    // ========================================

    pub fn begin_upload(&mut self) -> ImportResult<()> {
        if self.uploading {
            return Err(ImportError::UploadInFlight);
        }
        self.uploading = true;
        Ok(())
    }

    /// Seed a fresh queued mirror for the new job
    pub fn finish_upload_success(&mut self, task_id: String, kind: ImportKind) {
        self.uploading = false;
        self.current_task = Some(ImportJob::queued(task_id, kind));
    }

    /// Leave any prior job untouched
    pub fn finish_upload_failure(&mut self) {
        self.uploading = false;
    }

    // ========================================
    // Job Mirror
    // ========================================

    /// Sequence number for the next status request
    pub fn issue_poll_seq(&mut self) -> u64 {
        self.poll_seq_issued += 1;
        self.poll_seq_issued
    }

    /// Offer a poll response for `task_id` tagged with `seq`
    pub fn apply_poll(&mut self, seq: u64, task_id: &str, mut job: ImportJob) -> PollOutcome {
        let is_current = self
            .current_task
            .as_ref()
            .is_some_and(|current| current.task_id == task_id);
        if !is_current {
            return PollOutcome::Orphaned;
        }
        if seq <= self.poll_seq_applied {
            return PollOutcome::Stale;
        }
        self.poll_seq_applied = seq;

        if job.task_id.is_empty() {
            job.task_id = task_id.to_string();
        }
        let terminal = job.is_terminal();
        self.replace_task(job);
        PollOutcome::Applied { terminal }
    }

    /// Replace the mirror wholesale, recording the job in history on its
    /// first arrival in a terminal status
    pub fn replace_task(&mut self, job: ImportJob) {
        if !job.counts_within_total() {
            tracing::warn!(
                task_id = %job.task_id,
                total = job.total_records,
                success = job.success_count,
                errors = job.error_count,
                "Job counters exceed total record count"
            );
        }

        let was_terminal = self
            .current_task
            .as_ref()
            .is_some_and(|current| current.task_id == job.task_id && current.is_terminal());
        if job.is_terminal() && !was_terminal {
            self.history.insert(0, job.clone());
            self.history.truncate(HISTORY_LIMIT);
        }
        self.current_task = Some(job);
    }

    pub fn clear_current_task(&mut self) {
        self.current_task = None;
        self.notice = None;
    }

    /// The mirrored job is queued or running
    pub fn needs_polling(&self) -> bool {
        self.current_task
            .as_ref()
            .is_some_and(|job| !job.is_terminal())
    }

    // ========================================
    // Notices
    // ========================================

    pub fn set_notice(&mut self, level: NoticeLevel, text: impl Into<String>) {
        self.notice = Some(Notice {
            level,
            text: text.into(),
            shown_at: Instant::now(),
        });
    }

    /// Current notice unless it has outlived `ttl`
    pub fn visible_notice(&self, now: Instant, ttl: Duration) -> Option<&Notice> {
        self.notice
            .as_ref()
            .filter(|notice| !notice.is_expired(now, ttl))
    }

    pub fn clear_notice(&mut self) {
        self.notice = None;
    }
}
