//! Dev sessions: long-running commands started by `start_dev`.
//!
//! Sessions outlive the pipeline step that started them, backgrounded or
//! not, and run until `stop_dev`, until their command exits, or until the
//! run is cancelled.
//! Their output goes to `~/.config/stevedore/logs/dev-<name>.log`.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use tokio_util::sync::CancellationToken;

use crate::config::DevConfig;
use crate::context::ExecutionContext;
use crate::engine::exec::{self, ProcessSpec};
use crate::engine::{DevManager, Input};
use crate::error::{Error, Result};
use crate::log::Logger;
use crate::utils::args::{select, ArgSpec};

const START_DEV_ARGS: ArgSpec<'static> = ArgSpec {
    command: "start_dev",
    switches: &["all"],
    options: &[],
};

const STOP_DEV_ARGS: ArgSpec<'static> = ArgSpec {
    command: "stop_dev",
    switches: &["all"],
    options: &[],
};

/// Sessions are per project so dependencies may reuse dev names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct SessionKey {
    project: String,
    name: String,
}

struct Session {
    cancel: CancellationToken,
    finished: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Session {
    fn is_running(&self) -> bool {
        !self.finished.load(Ordering::SeqCst)
    }

    fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.join();
    }
}

#[derive(Default)]
pub struct DevSessionManager {
    sessions: Mutex<HashMap<SessionKey, Session>>,
    log: Option<Logger>,
}

impl DevSessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send every session's output to `log` instead of per-session files.
    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = Some(log);
        self
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionKey, Session>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Names of running sessions, sorted.
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sessions()
            .iter()
            .filter(|(_, session)| session.is_running())
            .map(|(key, _)| key.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn start(&self, ctx: &ExecutionContext, name: &str, dev: &DevConfig) -> Result<()> {
        let key = SessionKey {
            project: ctx.config().name.clone(),
            name: name.to_string(),
        };

        let mut sessions = self.sessions();
        if let Some(existing) = sessions.get(&key) {
            if existing.is_running() {
                return Err(Error::dev_already_running(name));
            }
            if let Some(finished) = sessions.remove(&key) {
                let _ = finished.handle.join();
            }
        }

        let cancel = ctx.run_cancel().child_token();
        let finished = Arc::new(AtomicBool::new(false));
        let log = self
            .log
            .clone()
            .unwrap_or_else(|| Logger::file(&format!("dev-{}", name)));

        let dir = match &dev.workdir {
            Some(workdir) => ctx.resolve_path(workdir),
            None => ctx.working_dir().to_path_buf(),
        };
        let mut env = ctx.env().as_ref().clone();
        env.extend(dev.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        let command = dev.command.clone();
        let kill_grace = ctx.defaults().exec.kill_grace();

        let handle = {
            let cancel = cancel.clone();
            let finished = Arc::clone(&finished);
            let name = name.to_string();
            thread::spawn(move || {
                log.info(format!("Start dev {}: {}", name, command));
                let args = vec!["-c".to_string(), command];
                let status = exec::run_process(&ProcessSpec {
                    program: OsStr::new("sh"),
                    args: &args,
                    dir: &dir,
                    env: Some(&env),
                    stdin: &Input::Null,
                    stdout: log.writer(),
                    stderr: log.writer(),
                    cancel: &cancel,
                    kill_grace,
                });
                match status {
                    Ok(status) if cancel.is_cancelled() => {
                        log.info(format!("Stopped dev {} ({})", name, status))
                    }
                    Ok(status) => log.info(format!("Dev {} exited ({})", name, status)),
                    Err(e) => log.error(format!("Dev {} failed to start: {}", name, e)),
                }
                finished.store(true, Ordering::SeqCst);
            })
        };

        sessions.insert(
            key,
            Session {
                cancel,
                finished,
                handle,
            },
        );
        ctx.log().info(format!("Started dev session {}", name));
        Ok(())
    }

    pub fn stop(&self, ctx: &ExecutionContext, name: &str) -> Result<()> {
        let key = SessionKey {
            project: ctx.config().name.clone(),
            name: name.to_string(),
        };
        let session = self
            .sessions()
            .remove(&key)
            .ok_or_else(|| Error::dev_not_running(name))?;

        // Lock released before joining; stopping can take the kill grace.
        session.stop();
        ctx.log().info(format!("Stopped dev session {}", name));
        Ok(())
    }
}

impl DevManager for DevSessionManager {
    fn start_dev(&self, ctx: &ExecutionContext, args: &[String]) -> Result<()> {
        let parsed = START_DEV_ARGS.parse(args)?;
        let config = ctx.config();
        for (name, dev) in select(&config.dev, &parsed, Error::dev_not_found)? {
            self.start(ctx, name, dev)?;
        }
        Ok(())
    }

    fn stop_dev(&self, ctx: &ExecutionContext, args: &[String]) -> Result<()> {
        let parsed = STOP_DEV_ARGS.parse(args)?;
        if parsed.switch("all") {
            let project = &ctx.config().name;
            let keys: Vec<SessionKey> = self
                .sessions()
                .keys()
                .filter(|key| &key.project == project)
                .cloned()
                .collect();
            for key in keys {
                self.stop(ctx, &key.name)?;
            }
            return Ok(());
        }

        if parsed.positional.is_empty() {
            return Err(Error::validation_missing_argument(vec![
                "<name>...".to_string(),
                "--all".to_string(),
            ]));
        }
        for name in &parsed.positional {
            self.stop(ctx, name)?;
        }
        Ok(())
    }

    fn wait_all(&self) {
        let sessions: Vec<Session> = self.sessions().drain().map(|(_, s)| s).collect();
        for session in sessions {
            let _ = session.handle.join();
        }
    }

    fn stop_all(&self) {
        let sessions: Vec<Session> = self.sessions().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.stop();
        }
    }
}

impl Drop for DevSessionManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}
