//! Task sources for the queue runner.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::types::Task;

const TASKS_SCHEMA: &str = include_str!("../../schemas/tasks.schema.json");

/// Category assigned to prompts loaded from a pattern map.
pub const PATTERN_CATEGORY: &str = "Training";

/// One-shot, re-loadable list of tasks.
pub trait TaskSource: Send {
    fn load(&self) -> Result<Vec<Task>>;
}

/// Tasks held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticTasks(pub Vec<Task>);

impl TaskSource for StaticTasks {
    fn load(&self) -> Result<Vec<Task>> {
        Ok(self.0.clone())
    }
}

/// Tasks read from a JSON file on every load.
///
/// Accepted shapes:
/// - `[{"category": "...", "prompt": "..."}, ...]`
/// - `{"<prompt>": "<reference content>", ...}` where every key becomes a
///   `Training` task, in file order.
#[derive(Debug, Clone)]
pub struct TaskFile {
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskFileShape {
    List(Vec<Task>),
    Patterns(Map<String, Value>),
}

impl TaskFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TaskSource for TaskFile {
    fn load(&self) -> Result<Vec<Task>> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read tasks {}", self.path.display()))?;
        let tasks = parse_tasks(&contents)
            .with_context(|| format!("load tasks {}", self.path.display()))?;
        debug!(path = %self.path.display(), count = tasks.len(), "tasks loaded");
        Ok(tasks)
    }
}

/// Parse and validate a task file body.
pub fn parse_tasks(contents: &str) -> Result<Vec<Task>> {
    let value: Value = serde_json::from_str(contents).context("parse tasks json")?;
    validate_schema(&value)?;
    let shape: TaskFileShape = serde_json::from_value(value).context("deserialize tasks")?;
    let tasks = match shape {
        TaskFileShape::List(tasks) => tasks,
        TaskFileShape::Patterns(patterns) => patterns
            .into_iter()
            .map(|(prompt, _)| Task::new(PATTERN_CATEGORY, prompt))
            .collect(),
    };
    Ok(tasks)
}

fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(TASKS_SCHEMA).context("parse tasks schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(anyhow!(
            "tasks schema validation failed:\n- {}",
            messages.join("\n- ")
        ));
    }
    Ok(())
}
