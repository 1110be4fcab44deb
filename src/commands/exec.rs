use clap::Args;
use stevedore::engine::{Engine, HandlerContext, Input};
use stevedore::{runtime, script, utils::shell};

use crate::commands::GlobalArgs;

#[derive(Args)]
pub struct ExecArgs {
    /// Script text, or a command and its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Run an ad-hoc script outside any pipeline. Reserved pipeline commands
/// are rejected; everything else behaves as in a pipeline step.
///
/// Returns the script's exit status.
pub fn run(args: ExecArgs, global: &GlobalArgs) -> stevedore::Result<i32> {
    let ctx = global.context(true)?;
    let source = match args.command.as_slice() {
        [script] => script.clone(),
        words => shell::quote_args(words),
    };

    let hc = HandlerContext::from_context(&ctx).with_stdin(Input::Inherit);
    let engine = Engine::ad_hoc(ctx, runtime::native_subsystems());
    let status = script::run(&engine, &source, hc)?;
    Ok(status.code())
}
