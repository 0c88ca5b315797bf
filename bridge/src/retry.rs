//! Retry controller: generate, submit, poll, and self-correct up to a bound.
//!
//! Each attempt walks `Generating -> Submitting -> Polling` and ends in one of
//! `Succeeded`, `Retrying` or `Failed`. Attempts are an explicit bounded loop;
//! the only state carried between them is the previous content and its error.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::cancel::StopFlag;
use crate::core::fence::strip_fences;
use crate::core::policy::RetryPolicy;
use crate::core::types::{
    AttemptFailure, AttemptRecord, CommandId, Generated, Phase, PollStatus, Provenance, Task,
    TaskRun, Verdict,
};
use crate::events::{EventSink, Sender, emit};
use crate::io::channel::CommandChannel;
use crate::io::generator::Generator;
use crate::io::mailbox::MailboxStore;
use crate::io::poller::StatusPoller;

/// Content and failure of the attempt that just failed, fed into the next fix request.
struct Feedback {
    content: String,
    failure: AttemptFailure,
}

pub struct RetryController<M, G> {
    channel: CommandChannel<M>,
    poller: StatusPoller<M>,
    generator: G,
    policy: RetryPolicy,
}

impl<M: MailboxStore, G: Generator> RetryController<M, G> {
    pub fn new(store: Arc<M>, action: &str, generator: G, policy: RetryPolicy) -> Self {
        Self {
            channel: CommandChannel::new(store.clone(), action),
            poller: StatusPoller::new(store),
            generator,
            policy,
        }
    }

    /// Drive one task to a verdict.
    ///
    /// Makes at most `max_retries + 1` generation calls. A stop request ends the
    /// task with `Fail` within one poll interval.
    #[instrument(skip_all, fields(category = %task.category))]
    pub fn run_task(&self, task: &Task, stop: &StopFlag, sink: &dyn EventSink) -> TaskRun {
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut feedback: Option<Feedback> = None;

        for index in 0..self.policy.max_attempts() {
            if stop.is_requested() {
                emit(sink, Sender::System, "Stop requested; task abandoned.");
                return failed(attempts, AttemptFailure::Cancelled);
            }

            let record = self.run_attempt(index, task, feedback.as_ref(), stop, sink);
            let failure = record.failure.clone();
            let content = record.content.clone();
            attempts.push(record);

            let Some(failure) = failure else {
                transition(sink, index, Phase::Succeeded, Sender::Executor, "Execution succeeded.");
                return TaskRun {
                    verdict: Verdict::Pass,
                    attempts,
                    failure: None,
                };
            };

            if !failure.is_retryable() {
                let (sender, message) = match &failure {
                    AttemptFailure::ChannelUnavailable(detail) => (
                        Sender::Error,
                        format!("Could not write to the mailbox ({detail}); task failed."),
                    ),
                    _ => (Sender::System, "Stop requested; task abandoned.".to_string()),
                };
                transition(sink, index, Phase::Failed, sender, &message);
                return failed(attempts, failure);
            }

            if !self.policy.has_attempt_after(index) {
                transition(
                    sink,
                    index,
                    Phase::Failed,
                    Sender::System,
                    "Maximum retries reached; task failed.",
                );
                return failed(attempts, failure);
            }

            transition(
                sink,
                index,
                Phase::Retrying,
                Sender::System,
                &format!(
                    "Attempt {} failed; self-correction {}/{} next.",
                    index + 1,
                    index + 1,
                    self.policy.max_retries
                ),
            );
            feedback = Some(Feedback { content, failure });
        }

        // Only reachable with `max_attempts() == 0`, which the policy never yields.
        failed(attempts, AttemptFailure::Cancelled)
    }

    fn run_attempt(
        &self,
        index: u32,
        task: &Task,
        feedback: Option<&Feedback>,
        stop: &StopFlag,
        sink: &dyn EventSink,
    ) -> AttemptRecord {
        let generating = match feedback {
            None => "Generating content.".to_string(),
            Some(previous) => format!(
                "Self-correcting ({}/{}) after: {}",
                index, self.policy.max_retries, previous.failure
            ),
        };
        transition(sink, index, Phase::Generating, Sender::Generator, &generating);

        let generated = self.generate(&task.prompt, feedback);
        let content = strip_fences(&generated.content);
        emit(
            sink,
            Sender::System,
            format!("Source: {}", generated.provenance),
        );
        if stop.is_requested() {
            debug!("stop observed after generation; nothing submitted");
            return AttemptRecord {
                index,
                provenance: generated.provenance,
                content,
                command_id: None,
                failure: Some(AttemptFailure::Cancelled),
            };
        }

        transition(
            sink,
            index,
            Phase::Submitting,
            Sender::System,
            &format!("Submitting {} bytes to the executor.", content.len()),
        );
        let id = match self.channel.submit(&content) {
            Ok(id) => id,
            Err(err) => {
                return AttemptRecord {
                    index,
                    provenance: generated.provenance,
                    content,
                    command_id: None,
                    failure: Some(AttemptFailure::ChannelUnavailable(err.to_string())),
                };
            }
        };

        transition(
            sink,
            index,
            Phase::Polling,
            Sender::System,
            &format!("Waiting for command {id}."),
        );
        let failure = self.await_terminal(&id, stop).err();
        match &failure {
            Some(AttemptFailure::Execution(detail)) => {
                emit(sink, Sender::Executor, format!("Error: {detail}"));
            }
            Some(AttemptFailure::Timeout) => {
                emit(
                    sink,
                    Sender::Executor,
                    format!(
                        "No response within {:?}; treating as Timeout.",
                        self.policy.poll.ceiling()
                    ),
                );
            }
            _ => {}
        }

        AttemptRecord {
            index,
            provenance: generated.provenance,
            content,
            command_id: Some(id),
            failure,
        }
    }

    /// First attempt uses the plain prompt; later ones get the exact failing content and error.
    ///
    /// A generator error is not special-cased: its text becomes the content and
    /// will fail execution like any other bad content.
    fn generate(&self, prompt: &str, feedback: Option<&Feedback>) -> Generated {
        let result = match feedback {
            None => self.generator.generate(prompt),
            Some(previous) => self.generator.generate_fix(
                prompt,
                &previous.content,
                previous.failure.feedback(),
            ),
        };
        result.unwrap_or_else(|err| {
            warn!(err = ?err, "generation failed");
            Generated {
                content: format!("// generation error: {err:#}"),
                provenance: Provenance::Failed,
            }
        })
    }

    /// Poll at a fixed cadence until the executor answers, the budget runs out, or a stop is requested.
    fn await_terminal(&self, id: &CommandId, stop: &StopFlag) -> Result<(), AttemptFailure> {
        let budget = self.policy.poll;
        for iteration in 0..budget.iterations {
            if stop.is_requested() || !stop.sleep(budget.interval) {
                debug!(iteration, "stop observed while polling");
                return Err(AttemptFailure::Cancelled);
            }
            let report = self.poller.poll(id);
            match report.status {
                PollStatus::Success => return Ok(()),
                PollStatus::Error => return Err(AttemptFailure::Execution(report.result)),
                PollStatus::Pending | PollStatus::Unknown | PollStatus::Unavailable => {}
            }
        }
        Err(AttemptFailure::Timeout)
    }
}

fn failed(attempts: Vec<AttemptRecord>, failure: AttemptFailure) -> TaskRun {
    TaskRun {
        verdict: Verdict::Fail,
        attempts,
        failure: Some(failure),
    }
}

fn transition(sink: &dyn EventSink, attempt: u32, phase: Phase, sender: Sender, message: &str) {
    info!(attempt, phase = ?phase, "{message}");
    emit(sink, sender, message);
}
