//! Background session: at most one queue run at a time, stoppable from any thread.

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, warn};

use crate::cancel::StopFlag;
use crate::events::EventSink;
use crate::io::evidence::EvidenceRecorder;
use crate::io::generator::Generator;
use crate::io::mailbox::MailboxStore;
use crate::io::tasks::TaskSource;
use crate::queue::{QueueRunner, QueueSummary};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a session is already running")]
    AlreadyRunning,
    #[error("no session has been started")]
    NotStarted,
    #[error("session worker panicked")]
    WorkerPanicked,
    #[error("spawn session worker")]
    Spawn(#[source] std::io::Error),
}

/// Owner of the background worker and its stop flag.
#[derive(Debug, Default)]
pub struct Session {
    stop: StopFlag,
    worker: Mutex<Option<JoinHandle<QueueSummary>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the flag observed by the running worker.
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Start `runner` on a worker thread.
    ///
    /// Fails with [`SessionError::AlreadyRunning`] while a previous run is live.
    /// A finished run that was never waited on is joined and discarded first.
    pub fn start<M, G, R, S, E>(
        &self,
        runner: QueueRunner<M, G, R>,
        source: S,
        sink: E,
    ) -> Result<(), SessionError>
    where
        M: MailboxStore + 'static,
        G: Generator + 'static,
        R: EvidenceRecorder + 'static,
        S: TaskSource + 'static,
        E: EventSink + 'static,
    {
        let mut worker = self.lock_worker();
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(SessionError::AlreadyRunning);
        }
        if let Some(previous) = worker.take()
            && previous.join().is_err()
        {
            warn!("previous session worker panicked");
        }

        self.stop.reset();
        let stop = self.stop.clone();
        let handle = thread::Builder::new()
            .name("bridge-session".to_string())
            .spawn(move || runner.run(&source, &stop, &sink))
            .map_err(SessionError::Spawn)?;
        debug!("session worker started");
        *worker = Some(handle);
        Ok(())
    }

    /// Ask the running worker to stop. Returns immediately.
    pub fn stop(&self) {
        debug!("session stop requested");
        self.stop.request();
    }

    pub fn is_running(&self) -> bool {
        match self.worker.try_lock() {
            Ok(worker) => worker.as_ref().is_some_and(|handle| !handle.is_finished()),
            Err(TryLockError::Poisoned(poisoned)) => poisoned
                .into_inner()
                .as_ref()
                .is_some_and(|handle| !handle.is_finished()),
            // Another thread holds the lock while waiting on a live worker.
            Err(TryLockError::WouldBlock) => true,
        }
    }

    /// Block until the current run ends and return its summary.
    ///
    /// The worker lock is held while joining so no second run can start until
    /// this one has been observed finished.
    pub fn wait(&self) -> Result<QueueSummary, SessionError> {
        let mut worker = self.lock_worker();
        let handle = worker.take().ok_or(SessionError::NotStarted)?;
        handle.join().map_err(|_| SessionError::WorkerPanicked)
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<QueueSummary>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
