//! Pod log viewing through kubectl.
//!
//! `show` captures the last lines of a pod's (or label selector's) logs;
//! `follow` streams them to the context's logger until the run is
//! cancelled or kubectl exits.

use serde::Serialize;

use crate::context::ExecutionContext;
use crate::download::ToolCommand;
use crate::error::{Error, Result};
use crate::log::{Logger, SharedBuffer};

pub const DEFAULT_LINES: u32 = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct LogsOptions {
    pub pod: Option<String>,
    pub label_selector: Option<String>,
    pub container: Option<String>,
    pub namespace: Option<String>,
    pub lines: u32,
    pub follow: bool,
}

impl Default for LogsOptions {
    fn default() -> Self {
        Self {
            pod: None,
            label_selector: None,
            container: None,
            namespace: None,
            lines: DEFAULT_LINES,
            follow: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LogContent {
    pub target: String,
    pub lines: u32,
    pub content: String,
}

impl LogsOptions {
    fn target(&self) -> Result<String> {
        match (&self.pod, &self.label_selector) {
            (Some(pod), _) => Ok(pod.clone()),
            (None, Some(selector)) => Ok(format!("-l {}", selector)),
            (None, None) => Err(Error::validation_missing_argument(vec![
                "--pod".to_string(),
                "--label-selector".to_string(),
            ])),
        }
    }
}

/// Arguments for `kubectl logs`.
pub fn kubectl_args(options: &LogsOptions) -> Result<Vec<String>> {
    let mut args = Vec::new();
    if let Some(namespace) = &options.namespace {
        args.push("--namespace".to_string());
        args.push(namespace.clone());
    }
    args.push("logs".to_string());

    match (&options.pod, &options.label_selector) {
        (Some(pod), _) => args.push(pod.clone()),
        (None, Some(selector)) => {
            args.push("--selector".to_string());
            args.push(selector.clone());
        }
        (None, None) => {
            options.target()?;
        }
    }

    if let Some(container) = &options.container {
        args.push("--container".to_string());
        args.push(container.clone());
    }
    args.push(format!("--tail={}", options.lines));
    if options.follow {
        args.push("--follow".to_string());
    }
    Ok(args)
}

/// Capture the last `options.lines` lines of logs.
pub fn show(ctx: &ExecutionContext, options: &LogsOptions) -> Result<LogContent> {
    let options = LogsOptions {
        follow: false,
        ..options.clone()
    };
    let args = kubectl_args(&options)?;
    let kubectl = ctx.tools().ensure_command(ToolCommand::Kubectl)?;

    let buffer = SharedBuffer::new();
    let capture = ctx.with_logger(Logger::stream(buffer.writer(), ctx.log().level()));
    capture.run_command(&kubectl, &args)?;

    Ok(LogContent {
        target: options.target()?,
        lines: options.lines,
        content: buffer.contents(),
    })
}

/// Stream logs to the context's logger. Returns kubectl's exit code.
pub fn follow(ctx: &ExecutionContext, options: &LogsOptions) -> Result<i32> {
    let options = LogsOptions {
        follow: true,
        ..options.clone()
    };
    let args = kubectl_args(&options)?;
    let kubectl = ctx.tools().ensure_command(ToolCommand::Kubectl)?;

    match ctx.run_command(&kubectl, &args) {
        Ok(()) => Ok(0),
        Err(err) if err.is_cancelled() => Ok(0),
        Err(err) => Err(err),
    }
}
