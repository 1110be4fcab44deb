//! Commands stevedore can supply when they are missing from PATH.

use std::path::PathBuf;
use std::sync::Arc;

use crate::download::{Downloader, ToolCommand};
use crate::log::{write_line, Logger};

use super::cat;
use super::invocation::{ExitStatus, HandlerContext};

/// Name stevedore answers to inside its own pipeline scripts.
pub const SELF_COMMAND: &str = "stevedore";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    /// Ran natively; the status is final.
    Handled(ExitStatus),
    /// Execute this program in place of the requested name.
    Substitute(PathBuf),
    /// Not ours; let normal execution report the missing command.
    Declined,
}

pub trait FallbackProvider: Send + Sync {
    fn provide(&self, hc: &HandlerContext, name: &str, args: &[String]) -> Fallback;
}

pub struct BuiltinFallback {
    tools: Arc<Downloader>,
    log: Logger,
}

impl BuiltinFallback {
    pub fn new(tools: Arc<Downloader>) -> Self {
        Self {
            tools,
            log: Logger::file("shell"),
        }
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }
}

impl FallbackProvider for BuiltinFallback {
    fn provide(&self, hc: &HandlerContext, name: &str, args: &[String]) -> Fallback {
        if name == "cat" {
            return Fallback::Handled(cat::run(hc, args));
        }

        if let Some(tool) = ToolCommand::from_name(name) {
            return match self.tools.ensure_command(tool) {
                Ok(path) => Fallback::Substitute(path),
                Err(err) => {
                    self.log.error(format!("error installing {}: {}", name, err));
                    write_line(&hc.stderr, format_args!("{}: {}", name, err));
                    Fallback::Handled(ExitStatus::NOT_FOUND)
                }
            };
        }

        if name == SELF_COMMAND {
            return match std::env::current_exe() {
                Ok(path) => Fallback::Substitute(path),
                Err(err) => {
                    write_line(&hc.stderr, format_args!("{}: {}", name, err));
                    Fallback::Handled(ExitStatus::FAILURE)
                }
            };
        }

        Fallback::Declined
    }
}
