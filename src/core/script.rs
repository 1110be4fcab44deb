//! Minimal runner for pipeline scripts.
//!
//! Grammar, one simple command per line:
//! - `#` comments, blank lines, `\` line continuation
//! - single/double quotes, backslash escapes, `$VAR` / `${VAR}` expansion
//! - `NAME=value` assignments, alone or as a per-command prefix
//! - builtins: `cd`, `export`, `wait`, `exit`
//! - trailing `&` runs a command in the background
//!
//! Every other command goes through the supplied [`ExecHandler`]. The
//! script stops at the first failing command (errexit); background jobs
//! are cancelled when it does and are waited for when it finishes.

use std::sync::Arc;
use std::thread::{self, ScopedJoinHandle};

use crate::engine::{ExecHandler, ExitStatus, HandlerContext};
use crate::error::{Error, Result};
use crate::log::write_line;
use crate::utils::shell;

struct Line {
    number: usize,
    text: String,
}

fn logical_lines(source: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut pending: Option<Line> = None;

    for (index, raw) in source.lines().enumerate() {
        let mut current = pending.take().unwrap_or(Line {
            number: index + 1,
            text: String::new(),
        });

        match raw.strip_suffix('\\') {
            Some(continued) => {
                current.text.push_str(continued);
                pending = Some(current);
            }
            None => {
                current.text.push_str(raw);
                lines.push(current);
            }
        }
    }
    lines.extend(pending);
    lines
}

fn is_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            let mut chars = name.chars();
            matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
                && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

fn set_vars(hc: &mut HandlerContext, assignments: &[String]) {
    let env = Arc::make_mut(&mut hc.env);
    for assignment in assignments {
        if let Some((name, value)) = assignment.split_once('=') {
            env.insert(name.to_string(), value.to_string());
        }
    }
}

fn builtin_cd(hc: &mut HandlerContext, args: &[String]) -> ExitStatus {
    let target = match args.first() {
        Some(dir) => hc.dir.join(dir),
        None => match hc.env_var("HOME") {
            Some(home) => home.into(),
            None => return ExitStatus::SUCCESS,
        },
    };

    if target.is_dir() {
        hc.dir = target;
        ExitStatus::SUCCESS
    } else {
        write_line(
            &hc.stderr,
            format_args!(
                "cd: {}: No such file or directory",
                args.first().map(String::as_str).unwrap_or("")
            ),
        );
        ExitStatus::FAILURE
    }
}

fn wait_jobs(jobs: &mut Vec<ScopedJoinHandle<'_, Result<ExitStatus>>>) -> Result<ExitStatus> {
    let mut status = ExitStatus::SUCCESS;
    let mut failure = None;

    for job in jobs.drain(..) {
        let result = job
            .join()
            .unwrap_or_else(|_| Err(Error::internal_unexpected("background job panicked")));
        match result {
            Ok(job_status) if status.success() => status = job_status,
            Ok(_) => {}
            Err(err) => failure = failure.or(Some(err)),
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(status),
    }
}

/// Run `source` with `handler`, starting from `hc`'s directory and
/// environment. Returns the status of the last command, or of the first
/// one that failed.
pub fn run(handler: &dyn ExecHandler, source: &str, hc: HandlerContext) -> Result<ExitStatus> {
    let lines = logical_lines(source);

    thread::scope(|scope| {
        let mut hc = hc;
        let jobs_cancel = hc.cancel.child_token();
        let _cancel_jobs_on_return = jobs_cancel.clone().drop_guard();
        let mut jobs = Vec::new();
        let mut last = ExitStatus::SUCCESS;

        for line in &lines {
            if hc.cancel.is_cancelled() {
                return Err(Error::cancelled());
            }

            let mut words = shell::split_words(&line.text, |key| {
                hc.env_var(key).map(str::to_string)
            })
            .map_err(|problem| {
                Error::validation_invalid_argument(
                    "script",
                    format!("line {}: {}", line.number, problem),
                    None,
                    None,
                )
            })?;

            let background = words.last().is_some_and(|w| w.ends_with('&'));
            if background {
                if let Some(word) = words.last_mut() {
                    word.pop();
                    if word.is_empty() {
                        words.pop();
                    }
                }
            }

            let assignments = words.iter().take_while(|w| is_assignment(w)).count();
            if words.is_empty() {
                continue;
            }
            if assignments == words.len() {
                set_vars(&mut hc, &words);
                last = ExitStatus::SUCCESS;
                continue;
            }

            let command = words.split_off(assignments);
            let mut command_hc = hc.clone();
            set_vars(&mut command_hc, &words);

            let name = command[0].clone();
            let status = match name.as_str() {
                "cd" => builtin_cd(&mut hc, &command[1..]),
                "export" => {
                    // Bare names are already exported; only assignments matter.
                    let vars: Vec<String> = command[1..]
                        .iter()
                        .filter(|w| is_assignment(w))
                        .cloned()
                        .collect();
                    set_vars(&mut hc, &vars);
                    ExitStatus::SUCCESS
                }
                "wait" => wait_jobs(&mut jobs)?,
                "exit" => {
                    let code = match command.get(1) {
                        Some(code) => code.parse().map(ExitStatus).map_err(|_| {
                            Error::validation_invalid_argument(
                                "exit",
                                format!(
                                    "line {}: exit: {}: numeric argument required",
                                    line.number, code
                                ),
                                Some(code.clone()),
                                None,
                            )
                        })?,
                        None => last,
                    };
                    return Ok(code);
                }
                _ if background => {
                    command_hc.cancel = jobs_cancel.clone();
                    jobs.push(scope.spawn(move || handler.exec(&command_hc, &command)));
                    ExitStatus::SUCCESS
                }
                _ => handler.exec(&command_hc, &command)?,
            };

            last = status;
            if !status.success() {
                return Ok(status);
            }
        }

        let jobs_status = wait_jobs(&mut jobs)?;
        if hc.cancel.is_cancelled() {
            return Err(Error::cancelled());
        }
        if !jobs_status.success() {
            return Ok(jobs_status);
        }
        Ok(last)
    })
}
