use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::log::SharedWriter;

/// Exit status reported back to the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitStatus(pub i32);

impl ExitStatus {
    pub const SUCCESS: ExitStatus = ExitStatus(0);
    pub const FAILURE: ExitStatus = ExitStatus(1);
    /// Shell convention for "command not found".
    pub const NOT_FOUND: ExitStatus = ExitStatus(127);
    /// Shell convention for "found but not executable".
    pub const NOT_EXECUTABLE: ExitStatus = ExitStatus(126);

    pub fn code(self) -> i32 {
        self.0
    }

    pub fn success(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exit status {}", self.0)
    }
}

/// What a command reads on stdin.
#[derive(Debug, Clone, Default)]
pub enum Input {
    #[default]
    Null,
    /// The stevedore process' own stdin.
    Inherit,
    /// Bytes supplied by the caller (a here-string, a test fixture).
    Bytes(Arc<[u8]>),
}

/// The interpreter's state at the moment a command is intercepted.
///
/// Passed explicitly into every resolver and dispatcher call. Streams are
/// shared handles; cloning a `HandlerContext` never duplicates them.
#[derive(Clone)]
pub struct HandlerContext {
    pub dir: PathBuf,
    pub env: Arc<HashMap<String, String>>,
    pub stdin: Input,
    pub stdout: SharedWriter,
    pub stderr: SharedWriter,
    pub cancel: CancellationToken,
}

impl HandlerContext {
    /// Handler context whose streams are the context's logger sink.
    pub fn from_context(ctx: &ExecutionContext) -> Self {
        Self {
            dir: ctx.working_dir().to_path_buf(),
            env: Arc::clone(ctx.env()),
            stdin: Input::Null,
            stdout: Arc::clone(ctx.log().writer()),
            stderr: Arc::clone(ctx.log().writer()),
            cancel: ctx.cancel().clone(),
        }
    }

    pub fn with_stdin(mut self, stdin: Input) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn with_streams(mut self, stdout: SharedWriter, stderr: SharedWriter) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }
}
