//! Generation service abstraction.
//!
//! The [`Generator`] trait decouples the retry controller from whatever produces
//! content. Tests use scripted generators; the CLI uses [`CommandGenerator`],
//! which pipes a rendered prompt into an external command (a local model by
//! default) and reads the content from its stdout.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, instrument, warn};

use crate::core::types::{Generated, Provenance};
use crate::io::config::GeneratorConfig;
use crate::io::process::{ProcessLimits, run_with_input};
use crate::io::prompt::PromptEngine;

/// Produces executable content for a task.
///
/// Calls may block for as long as the backend takes; the retry controller
/// applies no timeout of its own.
pub trait Generator: Send {
    /// First attempt for `prompt`.
    fn generate(&self, prompt: &str) -> Result<Generated>;

    /// Correction attempt, given the exact content that failed and its error text.
    fn generate_fix(&self, prompt: &str, bad_content: &str, error: &str) -> Result<Generated>;
}

/// Generator that spawns a configured command per request.
pub struct CommandGenerator {
    command: Vec<String>,
    limits: ProcessLimits,
    prompts: PromptEngine,
}

impl CommandGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        if config.command.is_empty() {
            return Err(anyhow!("generator command must not be empty"));
        }
        Ok(Self {
            command: config.command.clone(),
            limits: ProcessLimits {
                timeout: Duration::from_secs(config.timeout_secs),
                output_limit_bytes: config.output_limit_bytes,
            },
            prompts: PromptEngine::new(config.preamble.clone())?,
        })
    }

    #[instrument(skip_all, fields(program = %self.command[0], prompt_bytes = prompt.len()))]
    fn invoke(&self, prompt: &str) -> Result<String> {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]);

        let output = run_with_input(cmd, Some(prompt.as_bytes()), self.limits)
            .with_context(|| format!("run generator {}", self.command[0]))?;

        if output.timed_out {
            warn!(timeout_secs = self.limits.timeout.as_secs(), "generator timed out");
            bail!("generator timed out after {:?}", self.limits.timeout);
        }
        if !output.status.success() {
            bail!(
                "generator failed with status {:?}: {}",
                output.status.code(),
                output.stderr.lossy().trim()
            );
        }
        if output.stdout.dropped > 0 {
            warn!(dropped = output.stdout.dropped, "generator output truncated");
        }

        let content = output.stdout.lossy().trim().to_string();
        if content.is_empty() {
            bail!("generator produced no output");
        }
        debug!(bytes = content.len(), "generator produced content");
        Ok(content)
    }
}

impl Generator for CommandGenerator {
    fn generate(&self, prompt: &str) -> Result<Generated> {
        let rendered = self.prompts.render_generate(prompt)?;
        Ok(Generated {
            content: self.invoke(&rendered)?,
            provenance: Provenance::Generated,
        })
    }

    fn generate_fix(&self, prompt: &str, bad_content: &str, error: &str) -> Result<Generated> {
        let rendered = self.prompts.render_fix(prompt, bad_content, error)?;
        Ok(Generated {
            content: self.invoke(&rendered)?,
            provenance: Provenance::Correction,
        })
    }
}
