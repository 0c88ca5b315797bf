//! Progress events for the presentation layer.
//!
//! # Separation of Concerns
//!
//! - **Progress events (this module)**: product output describing phase
//!   transitions and verdicts. Always emitted, unaffected by `RUST_LOG`.
//!
//! - **Tracing (`logging`)**: dev diagnostics on stderr.
//!
//! Events are fire-and-forget. A sink must never influence control flow, so
//! `emit` has no return value.

use std::fmt;
use std::sync::{Arc, mpsc};

/// Who an event is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    System,
    Generator,
    Executor,
    Error,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Sender::System => "System",
            Sender::Generator => "Generator",
            Sender::Executor => "Executor",
            Sender::Error => "Error",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub sender: Sender,
    pub message: String,
}

pub trait EventSink: Send {
    fn emit(&self, event: ProgressEvent);
}

/// Build and emit an event in one call.
pub fn emit(sink: &dyn EventSink, sender: Sender, message: impl Into<String>) {
    sink.emit(ProgressEvent {
        sender,
        message: message.into(),
    });
}

impl<S: EventSink + Sync + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: ProgressEvent) {
        (**self).emit(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn emit(&self, event: ProgressEvent) {
        (**self).emit(event);
    }
}

/// Prints `sender: message` lines to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: ProgressEvent) {
        println!("{}: {}", event.sender, event.message);
    }
}

/// Sends events over a channel to another thread (e.g. a UI loop).
///
/// A disconnected receiver drops events silently.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}
