//! User-facing rendering of job state

use cosdb_common::api::{ImportJob, RowIssue};

/// One-line progress, e.g. `40/100 succeeded, processing`
///
/// The error count is included only when non-zero.
pub fn progress_summary(job: &ImportJob) -> String {
    let mut summary = format!("{}/{} succeeded", job.success_count, job.total_records);
    if job.error_count > 0 {
        summary.push_str(&format!(", {} failed", job.error_count));
    }
    summary.push_str(", ");
    summary.push_str(job.status.label());
    summary
}

/// `row 12: bv_number - message`, omitting the parts that are absent
pub fn format_issue(issue: &RowIssue) -> String {
    let mut line = String::new();
    if let Some(row) = issue.row {
        line.push_str(&format!("row {}: ", row));
    }
    if let Some(field) = issue.field.as_deref().filter(|f| !f.is_empty()) {
        line.push_str(field);
        line.push_str(" - ");
    }
    line.push_str(&issue.message);
    line
}

/// Full multi-line report: summary, then error and warning lists
pub fn render_job(job: &ImportJob) -> Vec<String> {
    let mut lines = vec![format!("task {}: {}", job.task_id, progress_summary(job))];

    if !job.errors.is_empty() {
        lines.push(format!("errors ({}):", job.errors.len()));
        lines.extend(job.errors.iter().map(|e| format!("  {}", format_issue(e))));
    }
    if !job.warnings.is_empty() {
        lines.push(format!("warnings ({}):", job.warnings.len()));
        lines.extend(job.warnings.iter().map(|w| format!("  {}", format_issue(w))));
    }

    lines
}
