//! Generic utility primitives with zero domain knowledge.
//!
//! - `args` - Flag parsing for reserved commands
//! - `command` - Command execution with error handling
//! - `io` - File I/O with consistent error handling
//! - `shell` - Shell quoting and word splitting
//! - `template` - String template rendering

pub mod args;
pub mod command;
pub mod io;
pub mod shell;
pub(crate) mod template;
