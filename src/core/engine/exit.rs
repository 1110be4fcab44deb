use crate::error::Result;
use crate::log::{write_line, SharedWriter};

use super::invocation::ExitStatus;

/// Convert a subsystem result into an exit status.
///
/// Failures are written to stderr as `<command>: <error>`. Every failure
/// maps to status 1; subsystems never choose their own exit codes.
pub fn translate(command: &str, result: Result<()>, stderr: &SharedWriter) -> ExitStatus {
    match result {
        Ok(()) => ExitStatus::SUCCESS,
        Err(err) => {
            write_line(stderr, err.prefixed(command));
            ExitStatus::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::log::SharedBuffer;

    #[test]
    fn success_writes_nothing() {
        let stderr = SharedBuffer::new();
        let status = translate("build_images", Ok(()), &stderr.writer());
        assert_eq!(status, ExitStatus::SUCCESS);
        assert_eq!(stderr.contents(), "");
    }

    #[test]
    fn failure_is_prefixed_and_maps_to_one() {
        let stderr = SharedBuffer::new();
        let status = translate(
            "build_images",
            Err(Error::build_failed("api", "docker exited with status 2")),
            &stderr.writer(),
        );
        assert_eq!(status, ExitStatus::FAILURE);
        assert_eq!(
            stderr.contents(),
            "build_images: error building image api: docker exited with status 2\n"
        );
    }

    #[test]
    fn cancellation_maps_to_one() {
        let stderr = SharedBuffer::new();
        let status = translate("start_dev", Err(Error::cancelled()), &stderr.writer());
        assert_eq!(status, ExitStatus::FAILURE);
        assert_eq!(stderr.contents(), "start_dev: context canceled\n");
    }
}
