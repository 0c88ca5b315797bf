//! End-to-end exchange tests over a real mailbox file.
//!
//! A `FilePeer` thread plays the executor: it watches the mailbox file, answers
//! each new pending command from a script and writes the terminal record back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge::cancel::StopFlag;
use bridge::core::policy::RetryPolicy;
use bridge::core::types::{AttemptFailure, CommandStatus, PollStatus, Task, Verdict};
use bridge::io::channel::{CommandChannel, DEFAULT_ACTION};
use bridge::io::evidence::{NoEvidence, ReportRecorder};
use bridge::io::mailbox::{FileMailbox, MailboxStore};
use bridge::io::poller::StatusPoller;
use bridge::io::tasks::TaskFile;
use bridge::queue::{QueueRunner, QueueStop};
use bridge::retry::RetryController;
use bridge::session::Session;
use bridge::test_support::{
    FilePeer, RecordingSink, Reply, ScriptedGenerator, TestWorkspace, fast_policy,
};

fn file_controller(
    workspace: &TestWorkspace,
    generator: ScriptedGenerator,
    max_retries: u32,
) -> RetryController<FileMailbox, ScriptedGenerator> {
    let mailbox = FileMailbox::open(workspace.mailbox_path()).expect("open mailbox");
    RetryController::new(
        Arc::new(mailbox),
        DEFAULT_ACTION,
        generator,
        fast_policy(max_retries, 2_000),
    )
}

#[test]
fn self_corrects_against_file_executor() {
    let workspace = TestWorkspace::new().expect("workspace");
    let peer = FilePeer::spawn(
        workspace.mailbox_path(),
        vec![
            Reply::Error("CS0103: The name 'lvl' does not exist".to_string()),
            Reply::Error("CS1061: 'Wall' has no member 'Crate'".to_string()),
            Reply::Success,
        ],
    );
    let generator = ScriptedGenerator::new();
    let controller = file_controller(&workspace, generator.clone(), 3);
    let sink = RecordingSink::new();

    let run = controller.run_task(
        &Task::new("Training", "Create a wall"),
        &StopFlag::new(),
        &sink,
    );

    assert_eq!(run.verdict, Verdict::Pass);
    assert_eq!(run.generations(), 3);
    let calls = generator.calls();
    assert_eq!(
        calls[2].previous,
        Some((
            "content-1".to_string(),
            "CS1061: 'Wall' has no member 'Crate'".to_string()
        ))
    );
    let ids: Vec<_> = run
        .attempts
        .iter()
        .filter_map(|attempt| attempt.command_id.clone())
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids[0] != ids[1] && ids[1] != ids[2] && ids[0] != ids[2]);

    assert_eq!(
        peer.shutdown(),
        vec!["content-0", "content-1", "content-2"]
    );
}

#[test]
fn silent_executor_times_out_every_attempt() {
    let workspace = TestWorkspace::new().expect("workspace");
    let _peer = FilePeer::spawn(workspace.mailbox_path(), Vec::new());
    let generator = ScriptedGenerator::new();
    let mailbox = FileMailbox::open(workspace.mailbox_path()).expect("open mailbox");
    let controller = RetryController::new(
        Arc::new(mailbox),
        DEFAULT_ACTION,
        generator.clone(),
        fast_policy(1, 40),
    );

    let run = controller.run_task(
        &Task::new("Training", "Create a floor"),
        &StopFlag::new(),
        &RecordingSink::new(),
    );

    assert_eq!(run.verdict, Verdict::Fail);
    assert_eq!(run.failure, Some(AttemptFailure::Timeout));
    let calls = generator.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[1].previous,
        Some(("content-0".to_string(), "Timeout".to_string()))
    );
}

#[test]
fn poll_for_superseded_id_reports_unknown() {
    let workspace = TestWorkspace::new().expect("workspace");
    let store = Arc::new(FileMailbox::open(workspace.mailbox_path()).expect("open mailbox"));
    let channel = CommandChannel::new(store.clone(), DEFAULT_ACTION);
    let poller = StatusPoller::new(store.clone());

    let first = channel.submit("var a = 1;").expect("submit first");
    assert_eq!(poller.poll(&first).status, PollStatus::Pending);

    let second = channel.submit("var b = 2;").expect("submit second");
    let mut resolved = store.read().expect("read").expect("command");
    resolved.status = CommandStatus::Success;
    store.write(&resolved).expect("executor write");

    assert_eq!(poller.poll(&first).status, PollStatus::Unknown);
    assert_eq!(poller.poll(&second).status, PollStatus::Success);
}

#[test]
fn session_runs_task_file_and_writes_reports() {
    let workspace = TestWorkspace::new().expect("workspace");
    let tasks_path = workspace
        .write_tasks(&[
            Task::new("Walls", "Create a wall"),
            Task::new("Floors", "Create a floor"),
        ])
        .expect("write tasks");
    let _peer = FilePeer::spawn(
        workspace.mailbox_path(),
        vec![
            Reply::Success,
            Reply::Error("CS0246: type 'Flor' not found".to_string()),
            Reply::Success,
        ],
    );
    let runner = QueueRunner::new(
        file_controller(&workspace, ScriptedGenerator::new(), 3),
        Duration::from_millis(10),
        ReportRecorder::new(workspace.reports_dir()),
    );
    let sink = RecordingSink::new();
    let session = Session::new();

    session
        .start(runner, TaskFile::new(&tasks_path), sink.clone())
        .expect("start");
    let summary = session.wait().expect("wait");

    assert_eq!(summary.stop, QueueStop::Completed);
    assert_eq!(summary.passed(), 2);
    for outcome in &summary.outcomes {
        let path = outcome.evidence_path.as_ref().expect("evidence");
        assert!(path.is_file());
    }
    assert_eq!(sink.count_containing("Session complete: 2/2 passed."), 1);
}

#[test]
fn empty_task_file_ends_without_attempts() {
    let workspace = TestWorkspace::new().expect("workspace");
    let tasks_path = workspace.write_tasks(&[]).expect("write tasks");
    let generator = ScriptedGenerator::new();
    let runner = QueueRunner::new(
        file_controller(&workspace, generator.clone(), 3),
        Duration::ZERO,
        NoEvidence,
    );
    let sink = RecordingSink::new();

    let summary = runner.run(&TaskFile::new(&tasks_path), &StopFlag::new(), &sink);

    assert_eq!(summary.stop, QueueStop::NoTasks);
    assert!(generator.calls().is_empty());
    assert_eq!(sink.count_containing("No tasks loaded"), 1);
}

#[test]
fn stop_mid_poll_fails_current_task_and_skips_the_rest() {
    let workspace = TestWorkspace::new().expect("workspace");
    let tasks_path = workspace
        .write_tasks(&[
            Task::new("Training", "first"),
            Task::new("Training", "second"),
        ])
        .expect("write tasks");
    let _peer = FilePeer::spawn(workspace.mailbox_path(), Vec::new());
    let generator = ScriptedGenerator::new();
    let mailbox = FileMailbox::open(workspace.mailbox_path()).expect("open mailbox");
    let controller = RetryController::new(
        Arc::new(mailbox),
        DEFAULT_ACTION,
        generator.clone(),
        RetryPolicy::default(),
    );
    let runner = QueueRunner::new(controller, Duration::ZERO, NoEvidence);
    let sink = RecordingSink::new();
    let session = Session::new();

    session
        .start(runner, TaskFile::new(&tasks_path), sink.clone())
        .expect("start");
    while sink.count_containing("Waiting for command") == 0 {
        std::thread::sleep(Duration::from_millis(5));
    }
    let requested = Instant::now();
    session.stop();
    let summary = session.wait().expect("wait");

    // Default interval is 500 ms.
    assert!(requested.elapsed() < Duration::from_millis(1_500));
    assert_eq!(summary.stop, QueueStop::Stopped);
    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(summary.outcomes[0].verdict, Verdict::Fail);
    assert_eq!(generator.calls().len(), 1);
}
