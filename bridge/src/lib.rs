//! Mailbox bridge between a code generator and a remote executor.
//!
//! A requester writes one command at a time into a shared mailbox, an external
//! executor process runs it and writes back a status, and failed attempts are
//! fed back to the generator for a bounded number of corrections. The crate is
//! split the same way throughout:
//!
//! - **[`core`]**: Pure, deterministic types and rules (retry budget, fence
//!   stripping). No I/O.
//! - **[`io`]**: Side-effecting pieces (mailbox file, generator process, task
//!   files, reports, config).
//!
//! Orchestration modules ([`retry`], [`queue`], [`session`]) coordinate the two
//! and report progress through [`events`].

pub mod cancel;
pub mod core;
pub mod events;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod queue;
pub mod retry;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
