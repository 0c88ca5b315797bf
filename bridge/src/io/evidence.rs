//! Per-task evidence records.
//!
//! Evidence is best effort: a failure to record is logged and never changes a
//! verdict.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::types::{AttemptRecord, Task, TaskRun, Verdict};

/// Characters of the prompt kept in report file names.
const NAME_CHARS: usize = 20;

pub trait EvidenceRecorder: Send {
    /// Persist evidence for a finished task and return where it went.
    fn record(&self, task: &Task, run: &TaskRun) -> Option<PathBuf>;
}

impl<R: EvidenceRecorder + ?Sized> EvidenceRecorder for Box<R> {
    fn record(&self, task: &Task, run: &TaskRun) -> Option<PathBuf> {
        (**self).record(task, run)
    }
}

/// Records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvidence;

impl EvidenceRecorder for NoEvidence {
    fn record(&self, _task: &Task, _run: &TaskRun) -> Option<PathBuf> {
        None
    }
}

/// Writes one JSON report per task into a directory.
///
/// File names follow `<PASS|FAIL>_<prompt letters>_<HHMMSS>.json`.
#[derive(Debug, Clone)]
pub struct ReportRecorder {
    dir: PathBuf,
}

#[derive(Serialize)]
struct TaskReport<'a> {
    category: &'a str,
    prompt: &'a str,
    verdict: Verdict,
    recorded_at: String,
    attempts: &'a [AttemptRecord],
}

impl ReportRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn write_report(&self, task: &Task, run: &TaskRun) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create report dir {}", self.dir.display()))?;
        let now = Local::now();
        let path = self.dir.join(report_file_name(
            &task.prompt,
            run.verdict,
            &now.format("%H%M%S").to_string(),
        ));
        let report = TaskReport {
            category: &task.category,
            prompt: &task.prompt,
            verdict: run.verdict,
            recorded_at: now.to_rfc3339(),
            attempts: &run.attempts,
        };
        let mut buf = serde_json::to_string_pretty(&report).context("serialize report")?;
        buf.push('\n');
        fs::write(&path, buf).with_context(|| format!("write report {}", path.display()))?;
        Ok(path)
    }
}

impl EvidenceRecorder for ReportRecorder {
    fn record(&self, task: &Task, run: &TaskRun) -> Option<PathBuf> {
        match self.write_report(task, run) {
            Ok(path) => {
                debug!(path = %path.display(), "task report written");
                Some(path)
            }
            Err(err) => {
                warn!(err = ?err, "failed to write task report");
                None
            }
        }
    }
}

/// Build a filesystem-safe report name from the prompt.
pub fn report_file_name(prompt: &str, verdict: Verdict, timestamp: &str) -> String {
    let name: String = prompt
        .chars()
        .filter(|c| c.is_alphanumeric())
        .take(NAME_CHARS)
        .collect();
    format!("{}_{}_{}.json", verdict.label(), name, timestamp)
}

/// File name of `path`, for display in progress events.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AttemptFailure, Provenance};

    fn failed_run() -> TaskRun {
        TaskRun {
            verdict: Verdict::Fail,
            attempts: vec![AttemptRecord {
                index: 0,
                provenance: Provenance::Generated,
                content: "Wall.Crate();".to_string(),
                command_id: None,
                failure: Some(AttemptFailure::Timeout),
            }],
            failure: Some(AttemptFailure::Timeout),
        }
    }

    #[test]
    fn report_names_keep_only_alphanumerics() {
        let name = report_file_name("Create a 3m wall, please!", Verdict::Pass, "142501");
        assert_eq!(name, "PASS_Createa3mwallplease_142501.json");
    }

    #[test]
    fn report_names_are_bounded() {
        let name = report_file_name(&"x".repeat(100), Verdict::Fail, "000000");
        assert_eq!(name, format!("FAIL_{}_000000.json", "x".repeat(20)));
    }

    #[test]
    fn recorder_writes_report_with_attempts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let recorder = ReportRecorder::new(temp.path().join("reports"));

        let path = recorder
            .record(&Task::new("Training", "Create a wall"), &failed_run())
            .expect("report path");

        assert!(display_name(&path).starts_with("FAIL_Createawall_"));
        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(report["verdict"], "fail");
        assert_eq!(report["attempts"][0]["failure"]["kind"], "timeout");
    }

    #[test]
    fn recorder_failure_yields_no_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "file").expect("write");
        let recorder = ReportRecorder::new(blocker.join("reports"));

        assert_eq!(
            recorder.record(&Task::new("Training", "x"), &failed_run()),
            None
        );
    }
}
