//! Requester-side status lookup.

use std::sync::Arc;

use tracing::debug;

use crate::core::types::{CommandId, CommandStatus, PollReport, PollStatus};
use crate::io::mailbox::MailboxStore;

/// Reports the outcome the mailbox holds for one command id.
#[derive(Debug)]
pub struct StatusPoller<M> {
    store: Arc<M>,
}

impl<M: MailboxStore> StatusPoller<M> {
    pub fn new(store: Arc<M>) -> Self {
        Self { store }
    }

    /// Read the mailbox once. No side effects.
    ///
    /// Only the id of the command currently in the mailbox can match; a
    /// superseded id reads as `Unknown`, never as the newer command's outcome.
    pub fn poll(&self, id: &CommandId) -> PollReport {
        let stored = match self.store.read() {
            Ok(stored) => stored,
            Err(err) => {
                debug!(err = %err, "mailbox read failed during poll");
                return PollReport::unavailable();
            }
        };
        let Some(command) = stored.filter(|command| &command.id == id) else {
            return PollReport::unknown();
        };
        let status = match command.status {
            CommandStatus::Pending => PollStatus::Pending,
            CommandStatus::Success => PollStatus::Success,
            CommandStatus::Error => PollStatus::Error,
        };
        PollReport {
            status,
            result: command.result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Command;
    use crate::io::channel::{CommandChannel, DEFAULT_ACTION};
    use crate::test_support::MemoryMailbox;

    fn resolve(store: &MemoryMailbox, id: &CommandId, status: CommandStatus, result: &str) {
        let mut command = store.read().expect("read").expect("command");
        assert_eq!(&command.id, id);
        command.status = status;
        command.result = result.to_string();
        store.write(&command).expect("write");
    }

    #[test]
    fn reports_stored_status_verbatim() {
        let store = Arc::new(MemoryMailbox::new());
        let channel = CommandChannel::new(store.clone(), DEFAULT_ACTION);
        let poller = StatusPoller::new(store.clone());

        let id = channel.submit("x").expect("submit");
        assert_eq!(poller.poll(&id).status, PollStatus::Pending);

        resolve(&store, &id, CommandStatus::Error, "Runtime Error: boom");
        let report = poller.poll(&id);
        assert_eq!(report.status, PollStatus::Error);
        assert_eq!(report.result, "Runtime Error: boom");
    }

    #[test]
    fn idle_mailbox_reads_unknown() {
        let poller = StatusPoller::new(Arc::new(MemoryMailbox::new()));
        assert_eq!(poller.poll(&CommandId::new("nope")), PollReport::unknown());
    }

    #[test]
    fn superseded_id_never_reports_newer_outcome() {
        let store = Arc::new(MemoryMailbox::new());
        let channel = CommandChannel::new(store.clone(), DEFAULT_ACTION);
        let poller = StatusPoller::new(store.clone());

        let first = channel.submit("a").expect("submit a");
        assert_eq!(poller.poll(&first).status, PollStatus::Pending);

        let second = channel.submit("b").expect("submit b");
        resolve(&store, &second, CommandStatus::Success, "");

        assert_eq!(poller.poll(&first), PollReport::unknown());
        assert_eq!(poller.poll(&second).status, PollStatus::Success);
    }

    #[test]
    fn read_failure_reports_unavailable_error_text() {
        let store = Arc::new(MemoryMailbox::new());
        store
            .write(&Command::pending(CommandId::new("a"), DEFAULT_ACTION, "x"))
            .expect("write");
        store.set_unavailable(true);

        let report = StatusPoller::new(store).poll(&CommandId::new("a"));
        assert_eq!(report.status, PollStatus::Unavailable);
        assert_eq!(report.result, "ERROR");
    }
}
