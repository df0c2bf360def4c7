//! Job summary and markdown report
//!
//! The summary accounts for every node of a job in exactly one terminal
//! bucket. The markdown report is a human-readable rendering of it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::storage::{JobStatus, JobTotals};

/// Failures listed by URL in the markdown report
const REPORTED_FAILURES: usize = 50;

/// A failed or skipped node, kept for the report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIssue {
    pub url: String,
    /// Machine-readable reason code
    pub reason: String,
}

/// Final counts of a job
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub job_id: i64,
    pub status: JobStatus,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Candidates never admitted (duplicate, depth, scope, type, exclusion)
    pub rejected: u64,
    /// Succeeded nodes that were satisfied from an earlier job
    pub from_cache: u64,
    pub bytes_transferred: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub output_root: PathBuf,
    pub failures: Vec<NodeIssue>,
    pub skips: Vec<NodeIssue>,
}

impl JobSummary {
    pub fn new(job_id: i64, output_root: &Path, started_at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            status: JobStatus::Running,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            rejected: 0,
            from_cache: 0,
            bytes_transferred: 0,
            started_at,
            finished_at: started_at,
            output_root: output_root.to_path_buf(),
            failures: Vec::new(),
            skips: Vec::new(),
        }
    }

    /// Number of admitted nodes
    pub fn total(&self) -> u64 {
        self.succeeded + self.failed + self.skipped
    }

    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total() as f64 * 100.0
    }

    pub fn totals(&self) -> JobTotals {
        JobTotals {
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: self.skipped,
            bytes_transferred: self.bytes_transferred,
        }
    }
}

/// Writes the markdown report of a job
pub fn write_markdown_report(summary: &JobSummary, output_path: &Path) -> std::io::Result<()> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(output_path, format_markdown_report(summary))
}

/// Formats a job summary as markdown
pub fn format_markdown_report(summary: &JobSummary) -> String {
    let mut md = String::new();

    md.push_str("# Sumi-Mirror Job Report\n\n");

    md.push_str("## Job Information\n\n");
    md.push_str(&format!("- **Job ID**: {}\n", summary.job_id));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at.to_rfc3339()));
    let elapsed = summary.elapsed().as_secs_f64();
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds ({:.2} minutes)\n",
        elapsed,
        elapsed / 60.0
    ));
    md.push_str(&format!("- **Status**: {}\n", summary.status.to_db_string()));
    md.push_str(&format!(
        "- **Output**: {}\n\n",
        summary.output_root.display()
    ));

    md.push_str("## Results\n\n");
    md.push_str("| Outcome | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Succeeded | {} |\n", summary.succeeded));
    md.push_str(&format!("| ... from cache | {} |\n", summary.from_cache));
    md.push_str(&format!("| Failed | {} |\n", summary.failed));
    md.push_str(&format!("| Skipped | {} |\n", summary.skipped));
    md.push_str(&format!("| Rejected | {} |\n\n", summary.rejected));
    md.push_str(&format!(
        "- **Bytes Transferred**: {}\n",
        summary.bytes_transferred
    ));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        summary.success_rate()
    ));

    push_issues(&mut md, "Failures", &summary.failures);
    push_issues(&mut md, "Skipped", &summary.skips);

    md
}

fn push_issues(md: &mut String, title: &str, issues: &[NodeIssue]) {
    if issues.is_empty() {
        return;
    }
    md.push_str(&format!("## {}\n\n", title));
    md.push_str("| URL | Reason |\n");
    md.push_str("|-----|--------|\n");
    for issue in issues.iter().take(REPORTED_FAILURES) {
        md.push_str(&format!("| {} | {} |\n", issue.url, issue.reason));
    }
    if issues.len() > REPORTED_FAILURES {
        md.push_str(&format!(
            "\n... and {} more\n",
            issues.len() - REPORTED_FAILURES
        ));
    }
    md.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_summary() -> JobSummary {
        let started = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut summary = JobSummary::new(7, Path::new("/tmp/site"), started);
        summary.finished_at = started + chrono::Duration::seconds(90);
        summary.status = JobStatus::Completed;
        summary.succeeded = 9;
        summary.failed = 1;
        summary.skipped = 2;
        summary.rejected = 40;
        summary.bytes_transferred = 123_456;
        summary
    }

    #[test]
    fn test_totals_and_rate() {
        let summary = create_test_summary();
        assert_eq!(summary.total(), 12);
        assert_eq!(summary.elapsed(), Duration::from_secs(90));
        assert!((summary.success_rate() - 75.0).abs() < f64::EPSILON);
        assert_eq!(summary.totals().bytes_transferred, 123_456);
    }

    #[test]
    fn test_format_markdown_report() {
        let mut summary = create_test_summary();
        summary.failures.push(NodeIssue {
            url: "https://example.com/gone".to_string(),
            reason: "http-404".to_string(),
        });

        let markdown = format_markdown_report(&summary);
        assert!(markdown.contains("# Sumi-Mirror Job Report"));
        assert!(markdown.contains("- **Job ID**: 7"));
        assert!(markdown.contains("| Succeeded | 9 |"));
        assert!(markdown.contains("| Rejected | 40 |"));
        assert!(markdown.contains("| https://example.com/gone | http-404 |"));
        assert!(!markdown.contains("## Skipped"));
    }

    #[test]
    fn test_write_markdown_report() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("reports/job.md");
        write_markdown_report(&create_test_summary(), &path).unwrap();
        assert!(std::fs::read_to_string(path).unwrap().contains("Job Report"));
    }
}
