use crate::context::ExecutionContext;
use crate::log::Logger;

use super::invocation::HandlerContext;

/// Derive the context a reserved command runs with.
///
/// The result shares everything with `ambient` except the invocation's
/// cancellation token, working directory and environment. When the
/// command writes to the same stream as the ambient logger, that logger
/// is reused; otherwise a logger at the same level is created over the
/// command's stdout so redirected output lands where the script asked.
pub fn derive(ambient: &ExecutionContext, hc: &HandlerContext) -> ExecutionContext {
    let log = if ambient.log().writes_to(&hc.stdout) {
        ambient.log().clone()
    } else {
        Logger::stream(hc.stdout.clone(), ambient.log().level())
    };

    ambient
        .with_cancel(hc.cancel.clone())
        .with_working_dir(hc.dir.clone())
        .with_env(hc.env.clone())
        .with_logger(log)
}
