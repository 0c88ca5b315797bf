//! Bridge configuration stored under `.bridge/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::policy::{PollBudget, RetryPolicy};
use crate::io::channel::DEFAULT_ACTION;

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".bridge/config.toml";

/// Bridge configuration (TOML).
///
/// Missing fields fall back to the defaults the executor side expects
/// (500 ms polling, 40 polls per attempt, 3 corrections, 2 s cooldown).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Mailbox file shared with the executor.
    pub mailbox_path: PathBuf,

    /// Action tag stamped on every command.
    pub action: String,

    /// Correction attempts after the first attempt fails.
    pub max_retries: u32,

    pub poll_interval_ms: u64,

    /// Polls per attempt before the attempt times out.
    pub poll_iterations: u32,

    /// Pause between consecutive tasks so the executor can settle.
    pub cooldown_ms: u64,

    /// Task file used by `bridge run` when `--tasks` is not given.
    pub tasks_path: PathBuf,

    /// Directory for per-task reports. No reports are written when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_dir: Option<PathBuf>,

    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command that reads a prompt on stdin and prints content on stdout.
    pub command: Vec<String>,

    pub timeout_secs: u64,

    /// Truncate generator stdout beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Text placed before every prompt (host-specific rules).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preamble: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "ollama".to_string(),
                "run".to_string(),
                "qwen2.5-coder:latest".to_string(),
            ],
            timeout_secs: 5 * 60,
            output_limit_bytes: 200_000,
            preamble: None,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mailbox_path: std::env::temp_dir().join("bridge").join("mailbox.json"),
            action: DEFAULT_ACTION.to_string(),
            max_retries: 3,
            poll_interval_ms: 500,
            poll_iterations: 40,
            cooldown_ms: 2_000,
            tasks_path: PathBuf::from("tasks.json"),
            report_dir: None,
            generator: GeneratorConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.mailbox_path.as_os_str().is_empty() {
            return Err(anyhow!("mailbox_path must not be empty"));
        }
        if self.action.trim().is_empty() {
            return Err(anyhow!("action must not be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be > 0"));
        }
        if self.poll_iterations == 0 {
            return Err(anyhow!("poll_iterations must be > 0"));
        }
        if self.generator.command.is_empty() || self.generator.command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        if self.generator.output_limit_bytes == 0 {
            return Err(anyhow!("generator.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            poll: PollBudget {
                interval: Duration::from_millis(self.poll_interval_ms),
                iterations: self.poll_iterations,
            },
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `BridgeConfig::default()`.
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    if !path.exists() {
        let cfg = BridgeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BridgeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &BridgeConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
