//! Ambient state shared by everything that runs during one pipeline run.
//!
//! An `ExecutionContext` is a bundle of shared handles: cloning it never
//! copies configuration or caches, and the `with_*` methods derive scoped
//! views (different directory, logger, cancellation scope) for a single
//! invocation.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ProjectConfig;
use crate::defaults::Defaults;
use crate::download::Downloader;
use crate::engine::exec::{self, ProcessSpec};
use crate::engine::Input;
use crate::error::{Error, Result};
use crate::log::Logger;
use crate::paths;
use crate::utils::shell;

#[derive(Clone)]
pub struct ExecutionContext {
    config: Arc<ProjectConfig>,
    defaults: Arc<Defaults>,
    tools: Arc<Downloader>,
    working_dir: PathBuf,
    env: Arc<HashMap<String, String>>,
    log: Logger,
    cancel: CancellationToken,
    run_cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(
        config: ProjectConfig,
        defaults: Defaults,
        tools: Arc<Downloader>,
        working_dir: PathBuf,
        log: Logger,
    ) -> Self {
        let cancel = CancellationToken::new();
        Self {
            config: Arc::new(config),
            defaults: Arc::new(defaults),
            tools,
            working_dir,
            env: Arc::new(std::env::vars().collect()),
            log,
            run_cancel: cancel.clone(),
            cancel,
        }
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn config_arc(&self) -> &Arc<ProjectConfig> {
        &self.config
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    pub fn tools(&self) -> &Arc<Downloader> {
        &self.tools
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn env(&self) -> &Arc<HashMap<String, String>> {
        &self.env
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Token of the whole run. `with_cancel` scopes leave it untouched, so
    /// work that outlives a single invocation hangs off this one.
    pub fn run_cancel(&self) -> &CancellationToken {
        &self.run_cancel
    }

    pub fn with_working_dir(&self, dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: dir.into(),
            ..self.clone()
        }
    }

    pub fn with_logger(&self, log: Logger) -> Self {
        Self {
            log,
            ..self.clone()
        }
    }

    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn with_env(&self, env: Arc<HashMap<String, String>>) -> Self {
        Self {
            env,
            ..self.clone()
        }
    }

    /// View onto another project (used for dependencies).
    pub fn with_config(&self, config: Arc<ProjectConfig>) -> Self {
        Self {
            config,
            ..self.clone()
        }
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::cancelled())
        } else {
            Ok(())
        }
    }

    pub fn resolve_path(&self, path: &str) -> PathBuf {
        paths::resolve_in(&self.working_dir, path)
    }

    /// Run an external program in the working directory, streaming both
    /// output streams into this context's logger.
    pub fn run_command<P: AsRef<OsStr>>(&self, program: P, args: &[String]) -> Result<()> {
        self.check_cancelled()?;

        let program = program.as_ref();
        let display = format!(
            "{} {}",
            program.to_string_lossy(),
            shell::quote_args(args)
        );
        self.log.debug(format!("exec {}", display.trim_end()));

        let writer = self.log.writer();
        let status = exec::run_process(&ProcessSpec {
            program,
            args,
            dir: &self.working_dir,
            env: Some(self.env.as_ref()),
            stdin: &Input::Null,
            stdout: writer,
            stderr: writer,
            cancel: &self.cancel,
            kill_grace: self.defaults.exec.kill_grace(),
        })
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::command_not_found(program.to_string_lossy())
            } else {
                Error::internal_io(e.to_string(), Some(format!("run {}", display.trim_end())))
            }
        })?;

        self.check_cancelled()?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::command_failed(
                display.trim_end(),
                status.code(),
                String::new(),
            ))
        }
    }
}
