//! Shared deterministic types for the command/result exchange.
//!
//! These types define the contracts between the mailbox, the retry controller
//! and the queue runner. They do no I/O.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Opaque identifier stamped on every submitted command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(String);

impl CommandId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a command in the mailbox. Only `Pending -> {Success, Error}` is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Pending,
    Success,
    Error,
}

impl CommandStatus {
    /// Wire form used in the mailbox record.
    pub fn as_wire(self) -> &'static str {
        match self {
            CommandStatus::Pending => "PENDING",
            CommandStatus::Success => "SUCCESS",
            CommandStatus::Error => "ERROR",
        }
    }

    /// Parse the wire form, ignoring ASCII case. `IDLE` and unknown values yield `None`.
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(CommandStatus::Pending),
            "SUCCESS" => Some(CommandStatus::Success),
            "ERROR" => Some(CommandStatus::Error),
            _ => None,
        }
    }
}

/// One unit of submitted work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub id: CommandId,
    pub action: String,
    pub payload: String,
    pub status: CommandStatus,
    /// Empty unless `status` is `Error`, in which case it holds the failure detail.
    pub result: String,
}

impl Command {
    pub fn pending(id: CommandId, action: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id,
            action: action.into(),
            payload: payload.into(),
            status: CommandStatus::Pending,
            result: String::new(),
        }
    }
}

/// What the status poller observed for a given id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Pending,
    Success,
    Error,
    /// The mailbox holds no command, or a command with a different id.
    Unknown,
    /// The mailbox could not be read.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub status: PollStatus,
    pub result: String,
}

impl PollReport {
    pub fn unknown() -> Self {
        Self {
            status: PollStatus::Unknown,
            result: String::new(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            status: PollStatus::Unavailable,
            result: "ERROR".to_string(),
        }
    }
}

/// A unit of work loaded from a task source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub category: String,
    pub prompt: String,
}

impl Task {
    pub fn new(category: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            prompt: prompt.into(),
        }
    }
}

/// Which generation path produced a piece of content. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Generated,
    Correction,
    Failed,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Provenance::Generated => "generated",
            Provenance::Correction => "self-correction",
            Provenance::Failed => "generation failed",
        };
        f.write_str(label)
    }
}

/// Content returned by the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub content: String,
    pub provenance: Provenance,
}

/// Retry controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Generating,
    Submitting,
    Polling,
    Succeeded,
    Retrying,
    Failed,
}

/// Why a single attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AttemptFailure {
    /// The mailbox could not be written; retrying cannot help.
    ChannelUnavailable(String),
    /// The executor reported an error for the command.
    Execution(String),
    /// No terminal status within the poll budget.
    Timeout,
    /// The stop flag was observed.
    Cancelled,
}

impl AttemptFailure {
    /// Error text handed to the next correction request.
    pub fn feedback(&self) -> &str {
        match self {
            AttemptFailure::ChannelUnavailable(detail) => detail,
            AttemptFailure::Execution(detail) => detail,
            AttemptFailure::Timeout => "Timeout",
            AttemptFailure::Cancelled => "Cancelled",
        }
    }

    /// Whether another attempt may follow this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AttemptFailure::Execution(_) | AttemptFailure::Timeout)
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::ChannelUnavailable(detail) => write!(f, "channel unavailable: {detail}"),
            AttemptFailure::Execution(detail) => write!(f, "execution error: {detail}"),
            AttemptFailure::Timeout => f.write_str("timeout"),
            AttemptFailure::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Record of one generate-submit-poll cycle, kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub index: u32,
    pub provenance: Provenance,
    pub content: String,
    pub command_id: Option<CommandId>,
    /// `None` when the attempt succeeded.
    pub failure: Option<AttemptFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn label(self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
        }
    }
}

/// Everything the retry controller learned about one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRun {
    pub verdict: Verdict,
    pub attempts: Vec<AttemptRecord>,
    /// Failure of the last attempt when the verdict is `Fail`.
    pub failure: Option<AttemptFailure>,
}

impl TaskRun {
    /// Number of generation calls made for the task.
    pub fn generations(&self) -> usize {
        self.attempts.len()
    }
}

/// Task-level result handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub task: Task,
    pub verdict: Verdict,
    pub evidence_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_form_is_case_insensitive() {
        assert_eq!(
            CommandStatus::from_wire("success"),
            Some(CommandStatus::Success)
        );
        assert_eq!(CommandStatus::from_wire(" ERROR "), Some(CommandStatus::Error));
        assert_eq!(CommandStatus::from_wire("IDLE"), None);
        assert_eq!(CommandStatus::Pending.as_wire(), "PENDING");
    }

    #[test]
    fn timeout_feedback_is_the_literal_sentinel() {
        assert_eq!(AttemptFailure::Timeout.feedback(), "Timeout");
        assert_eq!(
            AttemptFailure::Execution("CS0103: x".to_string()).feedback(),
            "CS0103: x"
        );
    }

    #[test]
    fn only_execution_and_timeout_are_retryable() {
        assert!(AttemptFailure::Timeout.is_retryable());
        assert!(AttemptFailure::Execution(String::new()).is_retryable());
        assert!(!AttemptFailure::ChannelUnavailable("disk".to_string()).is_retryable());
        assert!(!AttemptFailure::Cancelled.is_retryable());
    }
}
