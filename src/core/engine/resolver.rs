use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use crate::context::ExecutionContext;

use super::dispatcher::Dispatcher;
use super::fallback::{Fallback, FallbackProvider};
use super::invocation::{ExitStatus, HandlerContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// The command ran inside stevedore; report this status.
    Handled(ExitStatus),
    /// Run `program` as an ordinary process.
    NotReserved { program: String },
}

/// Decides who runs a command: a subsystem, the system, or a fallback.
///
/// Order: reserved table, then executable lookup on the invocation's PATH,
/// then the fallback provider. A name found locally never reaches the
/// fallback provider.
pub struct Resolver {
    dispatcher: Dispatcher,
    pub(crate) fallback: Arc<dyn FallbackProvider>,
}

impl Resolver {
    pub fn new(dispatcher: Dispatcher, fallback: Arc<dyn FallbackProvider>) -> Self {
        Self {
            dispatcher,
            fallback,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn resolve(
        &self,
        ambient: &ExecutionContext,
        hc: &HandlerContext,
        name: &str,
        args: &[String],
    ) -> ResolutionOutcome {
        if let Some(command) = self.dispatcher.lookup(name) {
            return ResolutionOutcome::Handled(self.dispatcher.invoke(ambient, command, hc, args));
        }

        if lookup_executable(hc, name).is_some() {
            return ResolutionOutcome::NotReserved {
                program: name.to_string(),
            };
        }

        match self.fallback.provide(hc, name, args) {
            Fallback::Handled(status) => ResolutionOutcome::Handled(status),
            Fallback::Substitute(path) => ResolutionOutcome::NotReserved {
                program: path.to_string_lossy().to_string(),
            },
            Fallback::Declined => ResolutionOutcome::NotReserved {
                program: name.to_string(),
            },
        }
    }
}

/// Resolve `name` the way the child process would: against the
/// invocation's PATH, relative to its working directory.
pub fn lookup_executable(hc: &HandlerContext, name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    let path = hc.env_var("PATH").map(OsString::from);
    which::which_in(name, path, &hc.dir).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Input;
    use crate::log::SharedBuffer;
    use std::collections::HashMap;
    use tokio_util::sync::CancellationToken;

    fn handler_context(dir: &std::path::Path, path: &str) -> HandlerContext {
        let mut env = HashMap::new();
        env.insert("PATH".to_string(), path.to_string());
        HandlerContext {
            dir: dir.to_path_buf(),
            env: Arc::new(env),
            stdin: Input::Null,
            stdout: SharedBuffer::new().writer(),
            stderr: SharedBuffer::new().writer(),
            cancel: CancellationToken::new(),
        }
    }

    #[cfg(unix)]
    #[test]
    fn lookup_uses_invocation_path() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let tool = bin.join("mytool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let hc = handler_context(dir.path(), &bin.to_string_lossy());
        assert_eq!(lookup_executable(&hc, "mytool"), Some(tool));

        let empty = handler_context(dir.path(), "/nonexistent");
        assert_eq!(lookup_executable(&empty, "mytool"), None);
        assert_eq!(lookup_executable(&empty, ""), None);
    }
}
