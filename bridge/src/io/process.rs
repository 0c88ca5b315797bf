//! One-shot child processes: prompt in on stdin, content out on stdout.

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Bounds applied to a single child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessLimits {
    pub timeout: Duration,
    /// Bytes kept per output stream; anything beyond is read and discarded.
    pub output_limit_bytes: usize,
}

/// Bytes kept from one output stream, plus how many were discarded.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    pub dropped: usize,
}

impl Captured {
    pub fn lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Captured,
    pub stderr: Captured,
    /// The child was killed after exceeding `ProcessLimits::timeout`.
    pub timed_out: bool,
}

/// Run `cmd` to completion, writing `input` to its stdin first.
///
/// Both output pipes are drained on their own threads before any input is
/// written, so a child that echoes large input cannot deadlock against us.
#[instrument(skip_all, fields(timeout_ms = limits.timeout.as_millis() as u64))]
pub fn run_with_input(
    mut cmd: Command,
    input: Option<&[u8]>,
    limits: ProcessLimits,
) -> Result<ProcessOutput> {
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn command")?;
    debug!(pid = child.id(), "child spawned");

    let stdout = capture(child.stdout.take(), limits.output_limit_bytes)?;
    let stderr = capture(child.stderr.take(), limits.output_limit_bytes)?;
    if let Some(input) = input {
        feed(child.stdin.take(), input)?;
    }

    let timed_out = wait_or_kill(&mut child, limits.timeout)?;
    let status = child.wait().context("collect exit status")?;
    let stdout = collect(stdout).context("read stdout")?;
    let stderr = collect(stderr).context("read stderr")?;

    debug!(
        exit_code = ?status.code(),
        timed_out,
        stdout_bytes = stdout.bytes.len(),
        "child finished"
    );
    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

/// Write `input` and close stdin. A child that exits without reading is not an error.
fn feed(stdin: Option<ChildStdin>, input: &[u8]) -> Result<()> {
    let mut stdin = stdin.ok_or_else(|| anyhow!("stdin was not piped"))?;
    match stdin.write_all(input) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::BrokenPipe => {
            debug!("child closed stdin before reading its input");
            Ok(())
        }
        Err(err) => Err(err).context("write stdin"),
    }
}

/// Returns `true` if the child had to be killed.
fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<bool> {
    if child
        .wait_timeout(timeout)
        .context("wait for command")?
        .is_some()
    {
        return Ok(false);
    }
    warn!(timeout_ms = timeout.as_millis() as u64, "child timed out; killing");
    child.kill().context("kill timed-out command")?;
    Ok(true)
}

fn capture<R>(stream: Option<R>, limit: usize) -> Result<JoinHandle<Result<Captured>>>
where
    R: Read + Send + 'static,
{
    let mut stream = stream.ok_or_else(|| anyhow!("output stream was not piped"))?;
    Ok(thread::spawn(move || {
        let mut captured = Captured::default();
        let mut chunk = [0u8; 8192];
        loop {
            let n = stream.read(&mut chunk).context("read output")?;
            if n == 0 {
                return Ok(captured);
            }
            let keep = n.min(limit.saturating_sub(captured.bytes.len()));
            captured.bytes.extend_from_slice(&chunk[..keep]);
            captured.dropped += n - keep;
        }
    }))
}

fn collect(handle: JoinHandle<Result<Captured>>) -> Result<Captured> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}
