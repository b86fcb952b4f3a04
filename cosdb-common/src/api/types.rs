//! Wire types for the bulk import endpoints
//!
//! The backend reports job status as `pending` / `processing` / `success` /
//! `failed`. The longer `queued` / `running` / `succeeded` spellings are
//! accepted as aliases when decoding.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

// ========================================
// Import Kind
// ========================================

/// Data category an import file targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    /// Performance videos (the only kind the backend processes today)
    #[default]
    Video,
    /// Clubs
    Group,
    /// Tags
    Tag,
    /// Competitions
    Competition,
}

impl ImportKind {
    pub const ALL: [ImportKind; 4] = [
        ImportKind::Video,
        ImportKind::Group,
        ImportKind::Tag,
        ImportKind::Competition,
    ];

    /// Value sent as `import_type` / `type`
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::Video => "video",
            ImportKind::Group => "group",
            ImportKind::Tag => "tag",
            ImportKind::Competition => "competition",
        }
    }

    /// File name used when saving the downloaded template
    pub fn template_file_name(&self) -> String {
        format!("{}_import_template.xlsx", self.as_str())
    }
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImportKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("unknown import type: {}", s)))
    }
}

// ========================================
// Job Status
// ========================================

/// Lifecycle status of a server-side import job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "pending", alias = "queued")]
    Queued,
    #[serde(rename = "processing", alias = "running")]
    Running,
    #[serde(rename = "success", alias = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
}

impl JobStatus {
    /// Terminal statuses never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Queued => "pending",
            JobStatus::Running => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ========================================
// Import Job
// ========================================

/// A per-row problem reported by the backend
///
/// Task-level failures (e.g. an unreadable file) carry neither row nor field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIssue {
    #[serde(default)]
    pub row: Option<u32>,
    #[serde(default)]
    pub field: Option<String>,
    pub message: String,
}

impl RowIssue {
    pub fn new(row: Option<u32>, field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            row,
            field: field.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Client-side mirror of a server-tracked import job
///
/// Replaced wholesale on every accepted status response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub import_type: ImportKind,
    pub status: JobStatus,
    #[serde(default)]
    pub total_records: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub errors: Vec<RowIssue>,
    #[serde(default)]
    pub warnings: Vec<RowIssue>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    /// Fresh mirror for a just-submitted job: queued, zero counts
    pub fn queued(task_id: impl Into<String>, import_type: ImportKind) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            import_type,
            status: JobStatus::Queued,
            total_records: 0,
            success_count: 0,
            error_count: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            created_at: Some(now),
            updated_at: Some(now),
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// success + error must not exceed total once the job has left the queue
    pub fn counts_within_total(&self) -> bool {
        self.status == JobStatus::Queued
            || self
                .success_count
                .checked_add(self.error_count)
                .is_some_and(|sum| sum <= self.total_records)
    }
}

/// Accepts RFC 3339, naive ISO 8601 (treated as UTC), or anything else as `None`
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| parse_timestamp(&s)))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// ========================================
// Request / Response Bodies
// ========================================

/// POST body for key verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyKeyRequest {
    pub upload_key: String,
}

/// Key verification result
///
/// `token` is optional: when absent the verified key itself is the credential.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyKeyResponse {
    pub valid: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Import submission result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartImportResponse {
    pub task_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error body returned with non-success HTTP statuses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ApiErrorBody {
    /// First non-empty message field, in backend precedence order
    pub fn into_message(self) -> Option<String> {
        [self.error, self.message, self.detail]
            .into_iter()
            .flatten()
            .find(|m| !m.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_accepts_backend_and_long_spellings() {
        let cases = [
            ("pending", JobStatus::Queued),
            ("queued", JobStatus::Queued),
            ("processing", JobStatus::Running),
            ("running", JobStatus::Running),
            ("success", JobStatus::Succeeded),
            ("succeeded", JobStatus::Succeeded),
            ("failed", JobStatus::Failed),
        ];
        for (raw, expected) in cases {
            let status: JobStatus = serde_json::from_value(json!(raw)).unwrap();
            assert_eq!(status, expected, "decoding {raw}");
        }
    }

    #[test]
    fn test_status_serializes_backend_spelling() {
        assert_eq!(serde_json::to_value(JobStatus::Running).unwrap(), json!("processing"));
        assert_eq!(serde_json::to_value(JobStatus::Succeeded).unwrap(), json!("success"));
    }

    #[test]
    fn test_only_succeeded_and_failed_are_terminal() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_partial_job_body_uses_defaults() {
        // Failed responses may omit everything except status and errors
        let job: ImportJob = serde_json::from_value(json!({
            "status": "failed",
            "errors": [{"row": 12, "message": "invalid BV number"}]
        }))
        .unwrap();

        assert_eq!(job.task_id, "");
        assert_eq!(job.import_type, ImportKind::Video);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.total_records, 0);
        assert_eq!(job.errors, vec![RowIssue::new(Some(12), None, "invalid BV number")]);
        assert!(job.warnings.is_empty());
    }

    #[test]
    fn test_timestamps_are_parsed_leniently() {
        let job: ImportJob = serde_json::from_value(json!({
            "task_id": "t-1",
            "status": "processing",
            "created_at": "2024-01-01T08:30:00.123456+00:00",
            "updated_at": "2024-01-01T08:31:00",
            "completed_at": "not a date"
        }))
        .unwrap();

        assert!(job.created_at.is_some());
        assert_eq!(
            job.updated_at.unwrap().to_rfc3339(),
            "2024-01-01T08:31:00+00:00"
        );
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_queued_mirror_has_zero_counts() {
        let job = ImportJob::queued("abc", ImportKind::Video);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.success_count + job.error_count + job.total_records, 0);
        assert!(job.counts_within_total());
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_counts_within_total() {
        let mut job = ImportJob::queued("abc", ImportKind::Video);
        job.status = JobStatus::Running;
        job.total_records = 100;
        job.success_count = 40;
        assert!(job.counts_within_total());

        job.error_count = 61;
        assert!(!job.counts_within_total());
    }

    #[test]
    fn test_overflowing_counts_are_out_of_range() {
        let mut job = ImportJob::queued("abc", ImportKind::Video);
        job.status = JobStatus::Failed;
        job.total_records = 1;
        job.success_count = u64::MAX;
        job.error_count = 1;

        assert!(!job.counts_within_total());
    }

    #[test]
    fn test_import_kind_parsing_and_template_name() {
        assert_eq!("Group".parse::<ImportKind>().unwrap(), ImportKind::Group);
        assert!("forum".parse::<ImportKind>().is_err());
        assert_eq!(
            ImportKind::Video.template_file_name(),
            "video_import_template.xlsx"
        );
    }

    #[test]
    fn test_error_body_prefers_error_field() {
        let body: ApiErrorBody =
            serde_json::from_value(json!({"error": "bad file", "detail": "ignored"})).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("bad file"));

        let body: ApiErrorBody = serde_json::from_value(json!({"error": " ", "detail": "x"})).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("x"));

        assert_eq!(ApiErrorBody::default().into_message(), None);
    }
}
