//! Built-in `cat`, so scripts can read files on machines without coreutils.

use std::fs::File;
use std::io::{self, Read};

use crate::log::{lock_writer, write_line, SharedWriter};

use super::invocation::{ExitStatus, HandlerContext, Input};

/// Concatenate `args` (or stdin when empty, or for `-`) to stdout.
///
/// Unreadable files are reported and skipped; the status is 1 if any
/// file failed.
pub fn run(hc: &HandlerContext, args: &[String]) -> ExitStatus {
    let stdin_only = [String::from("-")];
    let sources = if args.is_empty() { &stdin_only[..] } else { args };

    let mut status = ExitStatus::SUCCESS;
    for source in sources {
        let copied = if source == "-" {
            copy_stdin(&hc.stdin, &hc.stdout)
        } else {
            File::open(hc.dir.join(source)).and_then(|file| copy(file, &hc.stdout))
        };

        if let Err(e) = copied {
            write_line(&hc.stderr, format_args!("cat: {}: {}", source, describe(&e)));
            status = ExitStatus::FAILURE;
        }
    }
    status
}

fn copy_stdin(stdin: &Input, out: &SharedWriter) -> io::Result<()> {
    match stdin {
        Input::Null => Ok(()),
        Input::Bytes(bytes) => copy(&bytes[..], out),
        Input::Inherit => copy(io::stdin().lock(), out),
    }
}

fn copy<R: Read>(mut reader: R, out: &SharedWriter) -> io::Result<()> {
    let mut buf = [0u8; 8192];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        lock_writer(out).write_all(&buf[..n])?;
    }
    lock_writer(out).flush()
}

fn describe(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "No such file or directory".to_string(),
        io::ErrorKind::PermissionDenied => "Permission denied".to_string(),
        _ => err.to_string(),
    }
}
