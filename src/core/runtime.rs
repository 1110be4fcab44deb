//! Wiring: the native subsystems and the context a CLI run starts from.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::build::DockerBuilder;
use crate::config;
use crate::context::ExecutionContext;
use crate::defaults::{self, Defaults};
use crate::dependency::DependencyRegistry;
use crate::deploy::KubectlDeployer;
use crate::dev::DevSessionManager;
use crate::download::Downloader;
use crate::engine::Subsystems;
use crate::error::Result;
use crate::log::{LogLevel, Logger};
use crate::pipeline::PipelineManager;

/// Subsystems backed by docker, kubectl and local processes, with a fresh
/// dev-session manager.
pub fn native_subsystems() -> Subsystems {
    native_subsystems_with_dev(Arc::new(DevSessionManager::new()))
}

/// Like [`native_subsystems`], sharing `dev` so the caller can wait for or
/// stop its sessions after the run.
pub fn native_subsystems_with_dev(dev: Arc<DevSessionManager>) -> Subsystems {
    Subsystems {
        pipelines: Arc::new(PipelineManager),
        images: Arc::new(DockerBuilder),
        deployments: Arc::new(KubectlDeployer),
        dev,
        dependencies: Arc::new(DependencyRegistry::new()),
    }
}

/// Options a CLI invocation bootstraps from.
#[derive(Debug, Clone, Default)]
pub struct Bootstrap {
    pub working_dir: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub debug: bool,
    /// Send logs and command output to stdout instead of stderr.
    pub raw_output: bool,
}

impl Bootstrap {
    /// Load global defaults and the project config, and build the root
    /// context.
    pub fn context(&self) -> Result<ExecutionContext> {
        let global = defaults::load_config();
        let level = if self.debug {
            LogLevel::Debug
        } else {
            global.log_level
        };

        let working_dir = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(|e| {
                crate::Error::internal_io(e.to_string(), Some("read current dir".to_string()))
            })?,
        };
        let project = match &self.config_file {
            Some(path) => config::load_file(&resolve_config_path(&working_dir, path))?,
            None => config::load(&working_dir)?,
        };

        let log = if self.raw_output {
            Logger::stdout(level)
        } else {
            Logger::stderr(level)
        };
        Ok(root_context(project, global.defaults, working_dir, log))
    }
}

fn resolve_config_path(dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_interrupt(_: libc::c_int) {
    if INTERRUPTED.swap(true, Ordering::SeqCst) {
        // SAFETY: _exit is async-signal-safe.
        unsafe { libc::_exit(130) }
    }
}

/// Turn the first SIGINT or SIGTERM into cancellation of `token`; a second
/// one exits immediately.
///
/// Commands run in their own process groups and never see the terminal's
/// Ctrl-C, so cancellation is what stops them.
pub fn cancel_on_interrupt(token: CancellationToken) {
    #[cfg(unix)]
    {
        let handler = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
        // SAFETY: the handler only touches an atomic and calls _exit.
        unsafe {
            libc::signal(libc::SIGINT, handler);
            libc::signal(libc::SIGTERM, handler);
        }
    }

    thread::spawn(move || {
        while !INTERRUPTED.load(Ordering::SeqCst) {
            if token.is_cancelled() {
                return;
            }
            thread::sleep(Duration::from_millis(50));
        }
        token.cancel();
    });
}

/// Root context using the HTTP downloader configured by `defaults`.
pub fn root_context(
    project: config::ProjectConfig,
    defaults: Defaults,
    working_dir: PathBuf,
    log: Logger,
) -> ExecutionContext {
    let tools = Arc::new(Downloader::http(defaults.tools.clone()));
    ExecutionContext::new(project, defaults, tools, working_dir, log)
}
