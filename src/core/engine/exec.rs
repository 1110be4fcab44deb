//! Default process execution for commands nobody intercepted.
//!
//! Output is pumped into the caller's shared writers on background
//! threads. When the cancellation token fires the child gets SIGTERM,
//! then SIGKILL once the grace period runs out.
//!
//! Unless it shares our terminal's stdin, the child leads its own process
//! group and signals go to the whole group, so grandchildren such as the
//! command behind `sh -c` are stopped with it.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::log::{lock_writer, write_line, SharedWriter};

use super::invocation::{ExitStatus, HandlerContext, Input};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct ProcessSpec<'a> {
    pub program: &'a OsStr,
    pub args: &'a [String],
    pub dir: &'a Path,
    /// Full environment for the child; `None` inherits ours.
    pub env: Option<&'a HashMap<String, String>>,
    pub stdin: &'a Input,
    pub stdout: &'a SharedWriter,
    pub stderr: &'a SharedWriter,
    pub cancel: &'a CancellationToken,
    pub kill_grace: Duration,
}

/// Run a process to completion (or cancellation) and return its status.
///
/// Spawn failures are returned as io errors so callers can tell a missing
/// program from one that ran and failed.
pub fn run_process(spec: &ProcessSpec<'_>) -> io::Result<ExitStatus> {
    let mut command = Command::new(spec.program);
    command
        .args(spec.args)
        .current_dir(spec.dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(env) = spec.env {
        command.env_clear().envs(env);
    }

    command.stdin(match spec.stdin {
        Input::Null => Stdio::null(),
        Input::Inherit => Stdio::inherit(),
        Input::Bytes(_) => Stdio::piped(),
    });

    // A background group reading the terminal would be stopped by SIGTTIN.
    let own_group = !matches!(spec.stdin, Input::Inherit);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        if own_group {
            command.process_group(0);
        }
    }

    let mut child = command.spawn()?;

    if let (Input::Bytes(bytes), Some(mut stdin)) = (spec.stdin, child.stdin.take()) {
        let bytes = bytes.clone();
        // Detached: a child that never reads must not block us.
        thread::spawn(move || {
            let _ = stdin.write_all(&bytes);
        });
    }

    let pumps: Vec<JoinHandle<()>> = [
        child.stdout.take().map(|out| pump(out, spec.stdout.clone())),
        child.stderr.take().map(|err| pump(err, spec.stderr.clone())),
    ]
    .into_iter()
    .flatten()
    .collect();

    let (status, terminated) =
        wait_or_terminate(&mut child, spec.cancel, spec.kill_grace, own_group)?;

    // After a kill, a process outside the group may still hold the pipes.
    let drain_deadline = terminated.then(|| Instant::now() + spec.kill_grace);
    join_pumps(pumps, drain_deadline);

    Ok(exit_status(status))
}

fn join_pumps(pumps: Vec<JoinHandle<()>>, deadline: Option<Instant>) {
    for handle in pumps {
        if let Some(deadline) = deadline {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(POLL_INTERVAL);
            }
            if !handle.is_finished() {
                continue;
            }
        }
        let _ = handle.join();
    }
}

fn pump<R: Read + Send + 'static>(mut reader: R, writer: SharedWriter) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let mut out = lock_writer(&writer);
                    if out.write_all(&buf[..n]).is_err() {
                        break;
                    }
                    let _ = out.flush();
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    })
}

/// Wait for the child, terminating it on cancellation. The flag reports
/// whether it was terminated.
fn wait_or_terminate(
    child: &mut Child,
    cancel: &CancellationToken,
    grace: Duration,
    group: bool,
) -> io::Result<(std::process::ExitStatus, bool)> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        if cancel.is_cancelled() {
            return terminate(child, grace, group).map(|status| (status, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn signal(child: &Child, group: bool, sig: libc::c_int) {
    let pid = child.id() as libc::pid_t;
    let target = if group { -pid } else { pid };
    // SAFETY: pid belongs to a child we have not yet reaped, and as group
    // leader it keeps the group id alive until then.
    unsafe {
        libc::kill(target, sig);
    }
}

#[cfg(unix)]
fn terminate(
    child: &mut Child,
    grace: Duration,
    group: bool,
) -> io::Result<std::process::ExitStatus> {
    signal(child, group, libc::SIGTERM);

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        thread::sleep(POLL_INTERVAL);
    }

    signal(child, group, libc::SIGKILL);
    child.wait()
}

#[cfg(not(unix))]
fn terminate(
    child: &mut Child,
    _grace: Duration,
    _group: bool,
) -> io::Result<std::process::ExitStatus> {
    let _ = child.kill();
    child.wait()
}

fn exit_status(status: std::process::ExitStatus) -> ExitStatus {
    if let Some(code) = status.code() {
        return ExitStatus(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ExitStatus(128 + signal);
        }
    }
    ExitStatus::FAILURE
}

/// Run `program` for an intercepted command the way a shell would.
///
/// A program that cannot be found reports status 127 and one that cannot
/// be executed reports 126, both with a message on the command's stderr.
pub fn default_exec(
    hc: &HandlerContext,
    program: &str,
    args: &[String],
    kill_grace: Duration,
) -> Result<ExitStatus> {
    if program.is_empty() {
        return Ok(ExitStatus::SUCCESS);
    }

    let spec = ProcessSpec {
        program: OsStr::new(program),
        args,
        dir: &hc.dir,
        env: Some(hc.env.as_ref()),
        stdin: &hc.stdin,
        stdout: &hc.stdout,
        stderr: &hc.stderr,
        cancel: &hc.cancel,
        kill_grace,
    };

    match run_process(&spec) {
        Ok(status) => Ok(status),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            write_line(&hc.stderr, format_args!("{}: command not found", program));
            Ok(ExitStatus::NOT_FOUND)
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            write_line(&hc.stderr, format_args!("{}: permission denied", program));
            Ok(ExitStatus::NOT_EXECUTABLE)
        }
        Err(e) => Err(Error::internal_io(
            e.to_string(),
            Some(format!("exec {}", program)),
        )),
    }
}
