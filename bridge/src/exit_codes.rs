//! Stable exit codes for bridge CLI commands.

/// Command succeeded; for `run` and `ask`, every task passed.
pub const OK: i32 = 0;
/// Invalid config, unreadable task file, empty task list or other errors.
pub const INVALID: i32 = 1;
/// At least one task ended with a failing verdict.
pub const FAILED: i32 = 2;
/// The session was stopped before every task was attempted.
pub const STOPPED: i32 = 3;
