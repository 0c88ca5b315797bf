//! Prompt rendering for the command-backed generator.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");
const FIX_TEMPLATE: &str = include_str!("prompts/fix.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
    preamble: Option<String>,
}

impl PromptEngine {
    pub fn new(preamble: Option<String>) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("generate", GENERATE_TEMPLATE)
            .context("load generate template")?;
        env.add_template("fix", FIX_TEMPLATE)
            .context("load fix template")?;
        Ok(Self {
            env,
            preamble: preamble.filter(|p| !p.trim().is_empty()),
        })
    }

    /// Prompt for a first attempt.
    pub fn render_generate(&self, prompt: &str) -> Result<String> {
        let template = self.env.get_template("generate")?;
        let rendered = template.render(context! {
            preamble => self.preamble.as_deref().map(str::trim),
            prompt => prompt.trim(),
        })?;
        Ok(rendered)
    }

    /// Prompt for a correction: the exact failing content and error are embedded.
    pub fn render_fix(&self, prompt: &str, content: &str, error: &str) -> Result<String> {
        let template = self.env.get_template("fix")?;
        let rendered = template.render(context! {
            preamble => self.preamble.as_deref().map(str::trim),
            prompt => prompt.trim(),
            content => content,
            error => error,
        })?;
        Ok(rendered)
    }
}
