//! Task queue runner: drives the retry controller over a list of tasks.

use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::cancel::StopFlag;
use crate::core::types::{Outcome, Verdict};
use crate::events::{EventSink, Sender, emit};
use crate::io::evidence::{EvidenceRecorder, display_name};
use crate::io::generator::Generator;
use crate::io::mailbox::MailboxStore;
use crate::io::tasks::TaskSource;
use crate::retry::RetryController;

/// Reason why [`QueueRunner::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStop {
    /// Every loaded task was attempted.
    Completed,
    /// A stop request ended the session early.
    Stopped,
    /// The source failed to load or yielded no tasks.
    NoTasks,
}

/// Summary of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSummary {
    pub outcomes: Vec<Outcome>,
    /// Number of tasks loaded from the source.
    pub total: usize,
    pub stop: QueueStop,
}

impl QueueSummary {
    fn empty() -> Self {
        Self {
            outcomes: Vec::new(),
            total: 0,
            stop: QueueStop::NoTasks,
        }
    }

    pub fn passed(&self) -> usize {
        self.count(Verdict::Pass)
    }

    pub fn failed(&self) -> usize {
        self.count(Verdict::Fail)
    }

    fn count(&self, verdict: Verdict) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.verdict == verdict)
            .count()
    }
}

pub struct QueueRunner<M, G, R> {
    controller: RetryController<M, G>,
    cooldown: Duration,
    recorder: R,
}

impl<M, G, R> QueueRunner<M, G, R>
where
    M: MailboxStore,
    G: Generator,
    R: EvidenceRecorder,
{
    pub fn new(controller: RetryController<M, G>, cooldown: Duration, recorder: R) -> Self {
        Self {
            controller,
            cooldown,
            recorder,
        }
    }

    /// Run every task from `source` in order, one at a time.
    ///
    /// The source is loaded once per call. Tasks are separated by the cooldown;
    /// a stop request ends the current task with `Fail` and skips the rest.
    #[instrument(skip_all)]
    pub fn run(
        &self,
        source: &dyn TaskSource,
        stop: &StopFlag,
        sink: &dyn EventSink,
    ) -> QueueSummary {
        let tasks = match source.load() {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(err = ?err, "task source failed to load");
                emit(sink, Sender::Error, format!("Could not load tasks: {err:#}"));
                return QueueSummary::empty();
            }
        };
        if tasks.is_empty() {
            emit(sink, Sender::Error, "No tasks loaded; nothing to run.");
            return QueueSummary::empty();
        }

        let total = tasks.len();
        info!(total, "session started");
        emit(sink, Sender::System, format!("Starting session with {total} tasks."));

        let mut outcomes = Vec::with_capacity(total);
        let mut stopped = false;
        for (index, task) in tasks.into_iter().enumerate() {
            if index > 0 && !stop.sleep(self.cooldown) {
                stopped = true;
                break;
            }
            if stop.is_requested() {
                stopped = true;
                break;
            }

            emit(
                sink,
                Sender::System,
                format!(
                    "Task {}/{} [{}]: {}",
                    index + 1,
                    total,
                    task.category,
                    task.prompt
                ),
            );
            let run = self.controller.run_task(&task, stop, sink);
            let evidence_path = self.recorder.record(&task, &run);

            match run.verdict {
                Verdict::Pass => emit(sink, Sender::System, "Task passed."),
                Verdict::Fail => emit(
                    sink,
                    Sender::System,
                    format!("Task failed after {} generations.", run.generations()),
                ),
            }
            if let Some(path) = &evidence_path {
                emit(
                    sink,
                    Sender::System,
                    format!("Report saved: {}", display_name(path)),
                );
            }

            outcomes.push(Outcome {
                task,
                verdict: run.verdict,
                evidence_path,
            });
        }

        let summary = QueueSummary {
            outcomes,
            total,
            stop: if stopped || stop.is_requested() {
                QueueStop::Stopped
            } else {
                QueueStop::Completed
            },
        };
        let message = match summary.stop {
            QueueStop::Stopped => format!(
                "Session stopped after {}/{} tasks: {} passed, {} failed.",
                summary.outcomes.len(),
                total,
                summary.passed(),
                summary.failed()
            ),
            _ => format!(
                "Session complete: {}/{} passed.",
                summary.passed(),
                total
            ),
        };
        info!(
            passed = summary.passed(),
            failed = summary.failed(),
            stop = ?summary.stop,
            "session finished"
        );
        emit(sink, Sender::System, message);
        summary
    }
}
