//! Test-only stand-ins for the executor, the generation service and the UI.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::policy::{PollBudget, RetryPolicy};
use crate::core::types::{Command, CommandStatus, Generated, Provenance, Task};
use crate::events::{EventSink, ProgressEvent};
use crate::io::generator::Generator;
use crate::io::mailbox::{FileMailbox, MailboxError, MailboxStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Retry policy with a 1 ms poll interval.
pub fn fast_policy(max_retries: u32, iterations: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        poll: PollBudget {
            interval: Duration::from_millis(1),
            iterations,
        },
    }
}

/// In-memory mailbox with no executor behind it.
#[derive(Debug, Default)]
pub struct MemoryMailbox {
    slot: Mutex<Option<Command>>,
    unavailable: AtomicBool,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read and write fail until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Overwrite the slot as the executor would.
    pub fn put(&self, command: Command) {
        *lock(&self.slot) = Some(command);
    }

    pub fn current(&self) -> Option<Command> {
        lock(&self.slot).clone()
    }

    fn check(&self) -> Result<(), MailboxError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MailboxError::unavailable(Path::new("memory"), "offline"));
        }
        Ok(())
    }
}

impl MailboxStore for MemoryMailbox {
    fn write(&self, command: &Command) -> Result<(), MailboxError> {
        self.check()?;
        self.put(command.clone());
        Ok(())
    }

    fn read(&self) -> Result<Option<Command>, MailboxError> {
        self.check()?;
        Ok(self.current())
    }
}

/// How a scripted executor answers one submitted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Success,
    Error(String),
    /// Never answer; the command stays pending.
    Silent,
}

impl Reply {
    fn apply(&self, command: &mut Command) {
        match self {
            Reply::Success => {
                command.status = CommandStatus::Success;
                command.result.clear();
            }
            Reply::Error(detail) => {
                command.status = CommandStatus::Error;
                command.result = detail.clone();
            }
            Reply::Silent => {}
        }
    }
}

/// In-memory mailbox whose executor answers each submission from a script.
///
/// The answer becomes visible on the first read after the write. Submissions
/// beyond the script stay silent.
#[derive(Debug, Default)]
pub struct ScriptedMailbox {
    replies: Mutex<VecDeque<Reply>>,
    slot: Mutex<Option<(Command, Reply)>>,
    submitted: Mutex<Vec<Command>>,
    reads: AtomicUsize,
}

impl ScriptedMailbox {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    /// Every command written, in order.
    pub fn submitted(&self) -> Vec<Command> {
        lock(&self.submitted).clone()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl MailboxStore for ScriptedMailbox {
    fn write(&self, command: &Command) -> Result<(), MailboxError> {
        let reply = lock(&self.replies).pop_front().unwrap_or(Reply::Silent);
        lock(&self.submitted).push(command.clone());
        *lock(&self.slot) = Some((command.clone(), reply));
        Ok(())
    }

    fn read(&self) -> Result<Option<Command>, MailboxError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut slot = lock(&self.slot);
        Ok(slot.as_mut().map(|(command, reply)| {
            reply.apply(command);
            command.clone()
        }))
    }
}

/// One call observed by [`ScriptedGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateCall {
    pub prompt: String,
    /// `(bad_content, error)` for correction requests.
    pub previous: Option<(String, String)>,
}

#[derive(Debug, Default)]
struct GeneratorState {
    contents: VecDeque<String>,
    fail_first: Option<String>,
    calls: Vec<GenerateCall>,
}

/// Generator that records every call.
///
/// Returns scripted contents in order, then `content-<n>` where `n` is the call
/// index. Clones share state so a test can keep a handle after moving one into
/// a controller.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGenerator {
    state: Arc<Mutex<GeneratorState>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: Vec<String>) -> Self {
        let generator = Self::new();
        lock(&generator.state).contents = contents.into();
        generator
    }

    /// Fail the first call with `message`, then behave like [`ScriptedGenerator::new`].
    pub fn failing_first(message: &str) -> Self {
        let generator = Self::new();
        lock(&generator.state).fail_first = Some(message.to_string());
        generator
    }

    pub fn calls(&self) -> Vec<GenerateCall> {
        lock(&self.state).calls.clone()
    }

    fn next(&self, call: GenerateCall, provenance: Provenance) -> Result<Generated> {
        let mut state = lock(&self.state);
        let index = state.calls.len();
        state.calls.push(call);
        if let Some(message) = state.fail_first.take() {
            return Err(anyhow!(message));
        }
        let content = state
            .contents
            .pop_front()
            .unwrap_or_else(|| format!("content-{index}"));
        Ok(Generated {
            content,
            provenance,
        })
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, prompt: &str) -> Result<Generated> {
        self.next(
            GenerateCall {
                prompt: prompt.to_string(),
                previous: None,
            },
            Provenance::Generated,
        )
    }

    fn generate_fix(&self, prompt: &str, bad_content: &str, error: &str) -> Result<Generated> {
        self.next(
            GenerateCall {
                prompt: prompt.to_string(),
                previous: Some((bad_content.to_string(), error.to_string())),
            },
            Provenance::Correction,
        )
    }
}

/// Sink that keeps every event. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        lock(&self.events).clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        lock(&self.events)
            .iter()
            .filter(|event| event.message.contains(needle))
            .count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ProgressEvent) {
        lock(&self.events).push(event);
    }
}

/// Executor stand-in that watches a mailbox file from its own thread.
///
/// Each new pending command consumes one scripted reply and the terminal
/// record is written back through the same file layout the real executor uses.
pub struct FilePeer {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<Vec<String>>>,
}

impl FilePeer {
    /// The mailbox file is initialized before the thread starts.
    pub fn spawn(path: impl Into<PathBuf>, replies: Vec<Reply>) -> Self {
        let mailbox = FileMailbox::new(path);
        if let Err(err) = mailbox.ensure_initialized() {
            panic!("file peer cannot initialize mailbox: {err}");
        }
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let handle = thread::spawn(move || {
            let mut replies: VecDeque<Reply> = replies.into();
            let mut seen: Vec<String> = Vec::new();
            let mut payloads: Vec<String> = Vec::new();
            while !flag.load(Ordering::SeqCst) {
                if let Ok(Some(mut command)) = mailbox.read()
                    && command.status == CommandStatus::Pending
                    && !seen.iter().any(|id| id == command.id.as_str())
                {
                    seen.push(command.id.as_str().to_string());
                    payloads.push(command.payload.clone());
                    let reply = replies.pop_front().unwrap_or(Reply::Silent);
                    if reply != Reply::Silent {
                        reply.apply(&mut command);
                        let _ = mailbox.write(&command);
                    }
                }
                thread::sleep(Duration::from_millis(2));
            }
            payloads
        });
        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Stop the peer and return every payload it saw, in order.
    pub fn shutdown(mut self) -> Vec<String> {
        self.stop_thread()
    }

    fn stop_thread(&mut self) -> Vec<String> {
        self.shutdown.store(true, Ordering::SeqCst);
        self.handle
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for FilePeer {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

/// Temporary directory holding a mailbox file and a tasks file.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn mailbox_path(&self) -> PathBuf {
        self.dir.path().join("mailbox.json")
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.dir.path().join("tasks.json")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.dir.path().join("reports")
    }

    /// Write `tasks` as a task list file.
    pub fn write_tasks(&self, tasks: &[Task]) -> Result<PathBuf> {
        let path = self.tasks_path();
        std::fs::write(&path, serde_json::to_string_pretty(tasks)?)?;
        Ok(path)
    }
}
