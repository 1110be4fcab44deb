//! Leveled loggers writing to shared streams or per-name log files.
//!
//! - `Logger::stream` wraps any writer (a step's stdout, a buffer)
//! - `Logger::file` appends to `~/.config/stevedore/logs/<name>.log`
//!
//! Loggers are cheap handles; clones write to the same sink.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::paths;

/// A writer shared between the interpreter, loggers and child-process pumps.
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

pub fn shared_writer<W: Write + Send + 'static>(writer: W) -> SharedWriter {
    Arc::new(Mutex::new(writer))
}

pub fn lock_writer(writer: &SharedWriter) -> MutexGuard<'_, dyn Write + Send + 'static> {
    writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Write one line, ignoring broken pipes and closed streams.
pub fn write_line(writer: &SharedWriter, line: impl Display) {
    let mut guard = lock_writer(writer);
    let _ = writeln!(guard, "{}", line);
    let _ = guard.flush();
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Clone)]
pub struct Logger {
    sink: SharedWriter,
    level: LogLevel,
    timestamps: bool,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level)
            .field("timestamps", &self.timestamps)
            .finish()
    }
}

impl Logger {
    pub fn stream(sink: SharedWriter, level: LogLevel) -> Self {
        Self {
            sink,
            level,
            timestamps: false,
        }
    }

    /// Logger writing to the process stdout.
    pub fn stdout(level: LogLevel) -> Self {
        Self::stream(shared_writer(io::stdout()), level)
    }

    pub fn stderr(level: LogLevel) -> Self {
        Self::stream(shared_writer(io::stderr()), level)
    }

    pub fn discard() -> Self {
        Self::stream(shared_writer(io::sink()), LogLevel::Error)
    }

    /// Per-name file logger. Repeated calls with the same name share one
    /// handle so concurrent writers do not interleave partial lines.
    pub fn file(name: &str) -> Self {
        static FILE_LOGGERS: OnceLock<Mutex<HashMap<String, Logger>>> = OnceLock::new();

        let loggers = FILE_LOGGERS.get_or_init(|| Mutex::new(HashMap::new()));
        let mut loggers = loggers.lock().unwrap_or_else(|p| p.into_inner());
        loggers
            .entry(name.to_string())
            .or_insert_with(|| open_file_logger(name))
            .clone()
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn with_level(&self, level: LogLevel) -> Self {
        Self {
            level,
            ..self.clone()
        }
    }

    pub fn writer(&self) -> &SharedWriter {
        &self.sink
    }

    /// Whether this logger writes to exactly `writer` (same allocation).
    pub fn writes_to(&self, writer: &SharedWriter) -> bool {
        Arc::ptr_eq(&self.sink, writer)
    }

    pub fn error(&self, message: impl Display) {
        self.log(LogLevel::Error, "error", message);
    }

    pub fn warn(&self, message: impl Display) {
        self.log(LogLevel::Warn, "warn", message);
    }

    pub fn info(&self, message: impl Display) {
        self.log(LogLevel::Info, "info", message);
    }

    pub fn done(&self, message: impl Display) {
        self.log(LogLevel::Info, "done", message);
    }

    pub fn debug(&self, message: impl Display) {
        self.log(LogLevel::Debug, "debug", message);
    }

    /// Unprefixed output, written regardless of level.
    pub fn write_line(&self, line: impl Display) {
        write_line(&self.sink, line);
    }

    fn log(&self, level: LogLevel, tag: &str, message: impl Display) {
        if level > self.level {
            return;
        }
        if self.timestamps {
            let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            write_line(&self.sink, format_args!("[{}] {:<5} {}", now, tag, message));
        } else {
            write_line(&self.sink, format_args!("{:<5} {}", tag, message));
        }
    }
}

fn open_file_logger(name: &str) -> Logger {
    let file = paths::log_file(name).ok().and_then(|path| {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok()?;
        }
        OpenOptions::new().create(true).append(true).open(path).ok()
    });

    match file {
        Some(file) => Logger {
            sink: shared_writer(file),
            level: LogLevel::Debug,
            timestamps: true,
        },
        None => Logger::discard(),
    }
}

/// In-memory writer whose contents stay readable after being handed out
/// as a `SharedWriter`.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writer(&self) -> SharedWriter {
        shared_writer(self.clone())
    }

    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&bytes).to_string()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self.0.lock().unwrap_or_else(|p| p.into_inner());
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
