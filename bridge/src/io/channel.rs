//! Requester-side command submission.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::types::{Command, CommandId};
use crate::io::mailbox::{MailboxError, MailboxStore};

/// Action tag understood by the executor.
pub const DEFAULT_ACTION: &str = "EXECUTE_CODE";

/// Writes new commands into the mailbox. Owned by the requester only.
#[derive(Debug)]
pub struct CommandChannel<M> {
    store: Arc<M>,
    action: String,
}

impl<M: MailboxStore> CommandChannel<M> {
    pub fn new(store: Arc<M>, action: impl Into<String>) -> Self {
        Self {
            store,
            action: action.into(),
        }
    }

    /// Submit `payload` as a new pending command and return its fresh id.
    ///
    /// Overwrites whatever command the mailbox held. A failed write is returned
    /// as-is; the channel does not retry it.
    pub fn submit(&self, payload: &str) -> Result<CommandId, MailboxError> {
        let id = CommandId::new(Uuid::new_v4().to_string());
        let command = Command::pending(id.clone(), self.action.as_str(), payload);
        match self.store.write(&command) {
            Ok(()) => {
                debug!(id = %id, bytes = payload.len(), "command submitted");
                Ok(id)
            }
            Err(err) => {
                warn!(err = %err, "command submission failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::core::types::CommandStatus;
    use crate::test_support::MemoryMailbox;

    #[test]
    fn submit_writes_pending_command() {
        let store = Arc::new(MemoryMailbox::new());
        let channel = CommandChannel::new(store.clone(), DEFAULT_ACTION);

        let id = channel.submit("var x = 1;").expect("submit");
        let stored = store.read().expect("read").expect("command");
        assert_eq!(stored.id, id);
        assert_eq!(stored.action, "EXECUTE_CODE");
        assert_eq!(stored.payload, "var x = 1;");
        assert_eq!(stored.status, CommandStatus::Pending);
        assert!(stored.result.is_empty());
    }

    #[test]
    fn submitted_ids_are_unique() {
        let store = Arc::new(MemoryMailbox::new());
        let channel = CommandChannel::new(store, DEFAULT_ACTION);

        let ids: HashSet<CommandId> = (0..500)
            .map(|_| channel.submit("x").expect("submit"))
            .collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn submit_surfaces_write_failure() {
        let store = Arc::new(MemoryMailbox::new());
        store.set_unavailable(true);
        let channel = CommandChannel::new(store, DEFAULT_ACTION);

        let err = channel.submit("x").unwrap_err();
        assert!(matches!(err, MailboxError::Unavailable { .. }));
    }
}
