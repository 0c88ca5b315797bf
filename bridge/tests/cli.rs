//! CLI tests: spawn the bridge binary and check exit codes and output.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use bridge::core::types::Task;
use bridge::exit_codes;
use bridge::io::config::{BridgeConfig, GeneratorConfig, write_config};
use bridge::test_support::TestWorkspace;

fn write_fast_config(workspace: &TestWorkspace, generator: Vec<&str>) -> PathBuf {
    let path = workspace.root().join(".bridge/config.toml");
    write_config(
        &path,
        &BridgeConfig {
            mailbox_path: workspace.mailbox_path(),
            max_retries: 1,
            poll_interval_ms: 5,
            poll_iterations: 400,
            cooldown_ms: 0,
            tasks_path: workspace.tasks_path(),
            generator: GeneratorConfig {
                command: generator.into_iter().map(str::to_string).collect(),
                timeout_secs: 10,
                ..GeneratorConfig::default()
            },
            ..BridgeConfig::default()
        },
    )
    .expect("write config");
    path
}

fn bridge(root: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_bridge"));
    cmd.current_dir(root).args(args).stdin(Stdio::null());
    cmd
}

#[test]
fn init_creates_config_and_idle_mailbox() {
    let workspace = TestWorkspace::new().expect("workspace");
    let config = write_fast_config(&workspace, vec!["cat"]);

    let status = bridge(workspace.root(), &["init", "--config"])
        .arg(&config)
        .status()
        .expect("bridge init");

    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(
        std::fs::read_to_string(workspace.mailbox_path()).expect("mailbox"),
        "{\"status\":\"IDLE\"}\n"
    );
}

#[test]
fn status_prints_mailbox_record() {
    let workspace = TestWorkspace::new().expect("workspace");
    let config = write_fast_config(&workspace, vec!["cat"]);
    std::fs::write(
        workspace.mailbox_path(),
        r#"{"CommandId":"abc","Action":"EXECUTE_CODE","Code":"x","Status":"ERROR","Result":"CS0103"}"#,
    )
    .expect("write mailbox");

    let output = bridge(workspace.root(), &["status", "--config"])
        .arg(&config)
        .output()
        .expect("bridge status");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"CommandId\": \"abc\""));
    assert!(stdout.contains("\"Result\": \"CS0103\""));
}

#[test]
fn run_with_empty_task_file_exits_invalid() {
    let workspace = TestWorkspace::new().expect("workspace");
    let config = write_fast_config(&workspace, vec!["cat"]);
    workspace.write_tasks(&[]).expect("write tasks");

    let output = bridge(workspace.root(), &["run", "--config"])
        .arg(&config)
        .output()
        .expect("bridge run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Error: No tasks loaded"));
}

#[test]
fn invalid_config_exits_invalid() {
    let workspace = TestWorkspace::new().expect("workspace");
    let config = workspace.root().join("bad.toml");
    std::fs::write(&config, "poll_iterations = 0\n").expect("write config");

    let status = bridge(workspace.root(), &["status", "--config"])
        .arg(&config)
        .status()
        .expect("bridge status");

    assert_eq!(status.code(), Some(exit_codes::INVALID));
}

#[cfg(unix)]
mod unix {
    use bridge::test_support::{FilePeer, Reply};

    use super::*;

    #[test]
    fn run_against_file_peer_passes_every_task() {
        let workspace = TestWorkspace::new().expect("workspace");
        let config = write_fast_config(&workspace, vec!["cat"]);
        workspace
            .write_tasks(&[
                Task::new("Walls", "Create a wall"),
                Task::new("Floors", "Create a floor"),
            ])
            .expect("write tasks");
        let peer = FilePeer::spawn(
            workspace.mailbox_path(),
            vec![
                Reply::Success,
                Reply::Error("CS0103: The name 'flor' does not exist".to_string()),
                Reply::Success,
            ],
        );

        let output = bridge(workspace.root(), &["run", "--config"])
            .arg(&config)
            .output()
            .expect("bridge run");

        assert_eq!(output.status.code(), Some(exit_codes::OK));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("System: Session complete: 2/2 passed."));

        // `cat` echoes the rendered prompt; the fix prompt carries the executor error.
        let payloads = peer.shutdown();
        assert_eq!(payloads.len(), 3);
        assert!(payloads[0].contains("Create a wall"));
        assert!(payloads[2].contains("CS0103: The name 'flor' does not exist"));
    }

    #[test]
    fn ask_fails_when_executor_keeps_erroring() {
        let workspace = TestWorkspace::new().expect("workspace");
        let config = write_fast_config(&workspace, vec!["cat"]);
        let _peer = FilePeer::spawn(
            workspace.mailbox_path(),
            vec![
                Reply::Error("first".to_string()),
                Reply::Error("second".to_string()),
            ],
        );

        let output = bridge(workspace.root(), &["ask", "Create a roof", "--config"])
            .arg(&config)
            .output()
            .expect("bridge ask");

        assert_eq!(output.status.code(), Some(exit_codes::FAILED));
        assert!(String::from_utf8_lossy(&output.stdout).contains("Maximum retries reached"));
    }
}
