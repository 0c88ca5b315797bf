//! Deterministic, pure logic shared by the bridge.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod fence;
pub mod policy;
pub mod types;
