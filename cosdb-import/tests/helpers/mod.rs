//! Test Helper Utilities
//!
//! Shared utilities for testing cosdb-import:
//! - `ScriptedApi`: in-memory `ImportApi` with call counters and scripted replies
//! - `mock_backend`: an axum server that speaks the import endpoints

#![allow(dead_code)]

pub mod mock_backend;

use async_trait::async_trait;
use cosdb_common::api::{ImportJob, ImportKind, StartImportResponse, VerifyKeyResponse};
use cosdb_import::{ImportApi, ImportError, ImportRequest, ImportResult, PageSettings};
use serde_json::Value;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub use mock_backend::{spawn_mock_backend, MockBackend};

/// Failure a scripted call should produce
#[derive(Debug, Clone)]
pub enum ScriptedFailure {
    Network,
    Unauthorized,
    Rejected(u16, &'static str),
    /// The call panics instead of returning
    Panic,
}

impl ScriptedFailure {
    fn to_error(&self) -> ImportError {
        match self {
            ScriptedFailure::Network => ImportError::Network("connection refused".to_string()),
            ScriptedFailure::Unauthorized => {
                ImportError::Unauthorized("credential expired".to_string())
            }
            ScriptedFailure::Rejected(status, message) => ImportError::Rejected {
                status: *status,
                message: message.to_string(),
            },
            ScriptedFailure::Panic => panic!("scripted status call panicked"),
        }
    }
}

/// Scripted `ImportApi`
///
/// Status replies are JSON values decoded into `ImportJob`, so tests exercise
/// the same decoding as the HTTP client. When the script runs out, the last
/// successful reply repeats.
pub struct ScriptedApi {
    pub verify_calls: AtomicUsize,
    pub start_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub template_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    verify_reply: Mutex<Result<VerifyKeyResponse, ScriptedFailure>>,
    start_reply: Mutex<Result<String, ScriptedFailure>>,
    status_script: Mutex<VecDeque<Result<Value, ScriptedFailure>>>,
    last_status: Mutex<Option<Value>>,
    status_delay: Mutex<Duration>,
    last_request: Mutex<Option<ImportRequest>>,
    credentials_seen: Mutex<Vec<String>>,
}

impl ScriptedApi {
    /// Accepts any key and issues `tok-abc`; submissions return `task-1`
    pub fn new() -> Self {
        Self {
            verify_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            template_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            verify_reply: Mutex::new(Ok(VerifyKeyResponse {
                valid: true,
                token: Some("tok-abc".to_string()),
                message: None,
            })),
            start_reply: Mutex::new(Ok("task-1".to_string())),
            status_script: Mutex::new(VecDeque::new()),
            last_status: Mutex::new(None),
            status_delay: Mutex::new(Duration::ZERO),
            last_request: Mutex::new(None),
            credentials_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_verify_reply(self, reply: Result<VerifyKeyResponse, ScriptedFailure>) -> Self {
        *self.verify_reply.lock().unwrap() = reply;
        self
    }

    pub fn with_start_reply(self, reply: Result<String, ScriptedFailure>) -> Self {
        *self.start_reply.lock().unwrap() = reply;
        self
    }

    pub fn with_statuses(self, replies: Vec<Result<Value, ScriptedFailure>>) -> Self {
        *self.status_script.lock().unwrap() = replies.into();
        self
    }

    pub fn with_status_delay(self, delay: Duration) -> Self {
        *self.status_delay.lock().unwrap() = delay;
        self
    }

    pub fn set_start_reply(&self, reply: Result<String, ScriptedFailure>) {
        *self.start_reply.lock().unwrap() = reply;
    }

    pub fn verify_count(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn status_count(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn template_count(&self) -> usize {
        self.template_calls.load(Ordering::SeqCst)
    }

    /// Highest number of status requests ever outstanding at once
    pub fn max_concurrent_status(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ImportRequest> {
        self.last_request.lock().unwrap().clone()
    }

    pub fn credentials_seen(&self) -> Vec<String> {
        self.credentials_seen.lock().unwrap().clone()
    }

    fn next_status(&self) -> Result<Value, ScriptedFailure> {
        let next = self.status_script.lock().unwrap().pop_front();
        match next {
            Some(Ok(value)) => {
                *self.last_status.lock().unwrap() = Some(value.clone());
                Ok(value)
            }
            Some(Err(failure)) => Err(failure),
            None => self
                .last_status
                .lock()
                .unwrap()
                .clone()
                .ok_or(ScriptedFailure::Network),
        }
    }
}

#[async_trait]
impl ImportApi for ScriptedApi {
    async fn verify_key(&self, _key: &str) -> ImportResult<VerifyKeyResponse> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.verify_reply.lock().unwrap().clone();
        reply.map_err(|f| f.to_error())
    }

    async fn start_import(&self, request: ImportRequest) -> ImportResult<StartImportResponse> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        let reply = self.start_reply.lock().unwrap().clone();
        reply
            .map(|task_id| StartImportResponse {
                task_id,
                message: None,
            })
            .map_err(|f| f.to_error())
    }

    async fn fetch_status(&self, _task_id: &str, credential: &str) -> ImportResult<ImportJob> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.credentials_seen
            .lock()
            .unwrap()
            .push(credential.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.status_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let value = self.next_status().map_err(|f| f.to_error())?;
        serde_json::from_value(value).map_err(|e| ImportError::Decode(e.to_string()))
    }

    async fn download_template(
        &self,
        kind: ImportKind,
        _credential: &str,
    ) -> ImportResult<Vec<u8>> {
        self.template_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("template:{}", kind).into_bytes())
    }
}

/// Page settings with the production 2 s interval (tests run on a paused clock)
pub fn paused_clock_settings() -> PageSettings {
    PageSettings {
        poll_interval: Duration::from_secs(2),
        notice_ttl: Duration::from_secs(5),
        download_dir: PathBuf::from("."),
    }
}

/// Page settings with a short interval for real-clock tests
pub fn fast_settings(download_dir: PathBuf) -> PageSettings {
    PageSettings {
        poll_interval: Duration::from_millis(20),
        notice_ttl: Duration::from_secs(5),
        download_dir,
    }
}
