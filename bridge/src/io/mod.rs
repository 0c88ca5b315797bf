//! I/O helpers: the shared mailbox and everything else that touches the outside world.

pub mod channel;
pub mod config;
pub mod evidence;
pub mod generator;
pub mod mailbox;
pub mod poller;
pub mod process;
pub mod prompt;
pub mod tasks;
