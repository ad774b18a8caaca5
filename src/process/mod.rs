// src/process/mod.rs

//! External process layer.
//!
//! - [`command`] builds the editor / launcher command lines.
//! - [`table`] abstracts the OS process table (`sysinfo` in production).
//! - [`waiter`] implements the direct-child and indirect-discovery wait
//!   protocols, both strictly bounded by a deadline.

pub mod command;
pub mod table;
pub mod waiter;

pub use command::{
    direct_command, editor_args, intermediary_command, shortcut_uri, CommandLine,
    EditorInvocation,
};
pub use table::{ProcessInfo, ProcessTable, ProcessTableError, SysinfoProcessTable};
pub use waiter::{select_target_process, ProcessWaiter};
