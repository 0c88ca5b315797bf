//! Single-slot mailbox shared with the remote executor.
//!
//! The mailbox holds at most one command. Writers replace it wholesale (last
//! writer wins); nothing is locked. The executor runs in another process and
//! may rewrite the record at any time, so every read is treated as racing with
//! an external writer.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::types::{Command, CommandId, CommandStatus};

const IDLE: &str = "IDLE";

#[derive(Debug, Error)]
pub enum MailboxError {
    /// The store could not be read, parsed or written.
    #[error("mailbox {} unavailable: {detail}", .path.display())]
    Unavailable { path: PathBuf, detail: String },
}

impl MailboxError {
    pub fn unavailable(path: &Path, detail: impl Into<String>) -> Self {
        MailboxError::Unavailable {
            path: path.to_path_buf(),
            detail: detail.into(),
        }
    }
}

/// Storage medium for the single live command.
pub trait MailboxStore: Send + Sync {
    /// Replace the stored command. Readers never observe a partial record.
    fn write(&self, command: &Command) -> Result<(), MailboxError>;

    /// Return the stored command, or `None` when the mailbox is idle.
    fn read(&self) -> Result<Option<Command>, MailboxError>;
}

/// On-disk layout shared with the executor.
///
/// Field names are PascalCase. The idle record written on initialization is
/// `{"status": "IDLE"}`, so `Status` is also accepted in lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxRecord {
    #[serde(rename = "CommandId", default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    #[serde(rename = "Action", default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(rename = "Code", default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(
        rename = "Status",
        alias = "status",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<String>,
    #[serde(rename = "Result", default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl MailboxRecord {
    pub fn from_command(command: &Command) -> Self {
        Self {
            command_id: Some(command.id.as_str().to_string()),
            action: Some(command.action.clone()),
            code: Some(command.payload.clone()),
            status: Some(command.status.as_wire().to_string()),
            result: Some(command.result.clone()),
        }
    }

    /// Interpret the record as a command.
    ///
    /// Idle records and records without an id yield `None`. A record with an id
    /// but an unrecognized status is still in flight and reads as `Pending`.
    pub fn into_command(self) -> Option<Command> {
        let id = self.command_id.filter(|id| !id.trim().is_empty())?;
        let status = match self.status.as_deref() {
            Some(raw) if raw.trim().eq_ignore_ascii_case(IDLE) => return None,
            Some(raw) => CommandStatus::from_wire(raw).unwrap_or(CommandStatus::Pending),
            None => CommandStatus::Pending,
        };
        Some(Command {
            id: CommandId::new(id),
            action: self.action.unwrap_or_default(),
            payload: self.code.unwrap_or_default(),
            status,
            result: self.result.unwrap_or_default(),
        })
    }
}

/// Mailbox backed by a JSON file at a well-known path.
#[derive(Debug, Clone)]
pub struct FileMailbox {
    path: PathBuf,
}

impl FileMailbox {
    /// Create a handle without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a handle and make sure the mailbox file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MailboxError> {
        let mailbox = Self::new(path);
        mailbox.ensure_initialized()?;
        Ok(mailbox)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the idle record if no mailbox file exists yet.
    pub fn ensure_initialized(&self) -> Result<(), MailboxError> {
        if self.path.exists() {
            return Ok(());
        }
        debug!(path = %self.path.display(), "initializing idle mailbox");
        self.reset()
    }

    /// Unconditionally replace the mailbox with the idle record.
    pub fn reset(&self) -> Result<(), MailboxError> {
        let idle = serde_json::json!({ "status": IDLE });
        let mut buf = serde_json::to_string(&idle)
            .map_err(|err| MailboxError::unavailable(&self.path, err.to_string()))?;
        buf.push('\n');
        self.write_atomic(&buf)
    }

    /// Read the raw record. A missing file is initialized and reads as idle.
    pub fn read_record(&self) -> Result<MailboxRecord, MailboxError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                self.ensure_initialized()?;
                return Ok(MailboxRecord {
                    status: Some(IDLE.to_string()),
                    ..MailboxRecord::default()
                });
            }
            Err(err) => {
                return Err(MailboxError::unavailable(
                    &self.path,
                    format!("read: {err}"),
                ));
            }
        };
        // The executor may be mid-write if it does not replace the file atomically.
        if contents.trim().is_empty() {
            return Err(MailboxError::unavailable(&self.path, "empty record"));
        }
        serde_json::from_str(&contents)
            .map_err(|err| MailboxError::unavailable(&self.path, format!("parse: {err}")))
    }

    /// Write via a uniquely named temp file + rename so readers see either the
    /// old or the new record, even with several writers in flight.
    fn write_atomic(&self, contents: &str) -> Result<(), MailboxError> {
        let unavailable = |what: &str, err: std::io::Error| {
            MailboxError::unavailable(&self.path, format!("{what}: {err}"))
        };
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(|err| unavailable("create directory", err))?;
                parent
            }
            None => Path::new("."),
        };
        let mut tmp =
            NamedTempFile::new_in(dir).map_err(|err| unavailable("create temp record", err))?;
        tmp.write_all(contents.as_bytes())
            .map_err(|err| unavailable("write temp record", err))?;
        tmp.persist(&self.path)
            .map_err(|err| unavailable("replace record", err.error))?;
        Ok(())
    }
}

impl MailboxStore for FileMailbox {
    #[instrument(skip_all, fields(id = %command.id, status = command.status.as_wire()))]
    fn write(&self, command: &Command) -> Result<(), MailboxError> {
        let record = MailboxRecord::from_command(command);
        let mut buf = serde_json::to_string_pretty(&record)
            .map_err(|err| MailboxError::unavailable(&self.path, err.to_string()))?;
        buf.push('\n');
        self.write_atomic(&buf)?;
        debug!(path = %self.path.display(), "command written");
        Ok(())
    }

    fn read(&self) -> Result<Option<Command>, MailboxError> {
        Ok(self.read_record()?.into_command())
    }
}
