use std::path::PathBuf;
use std::sync::Arc;

use stevedore::context::ExecutionContext;
use stevedore::dev::DevSessionManager;
use stevedore::engine::{CommandTable, Dispatcher, HandlerContext, ReservedCommand, Subsystems};
use stevedore::runtime::{self, Bootstrap};

pub type CmdResult<T> = stevedore::Result<(T, i32)>;

pub(crate) struct GlobalArgs {
    pub debug: bool,
    pub config: Option<PathBuf>,
}

impl GlobalArgs {
    /// Root context for this invocation. JSON commands keep stdout for the
    /// response envelope, so their logs go to stderr.
    pub(crate) fn context(&self, raw_output: bool) -> stevedore::Result<ExecutionContext> {
        let ctx = Bootstrap {
            working_dir: None,
            config_file: self.config.clone(),
            debug: self.debug,
            raw_output,
        }
        .context()?;
        runtime::cancel_on_interrupt(ctx.run_cancel().clone());
        Ok(ctx)
    }
}

/// Run one of the ungated `build` / `deploy` / `dev` commands outside any
/// pipeline.
pub(crate) fn run_reduced(
    ctx: &ExecutionContext,
    subsystems: Subsystems,
    command: ReservedCommand,
    args: &[String],
) -> stevedore::Result<()> {
    let dispatcher = Dispatcher::new(CommandTable::reduced(), false, subsystems);
    dispatcher.call(ctx, command, &HandlerContext::from_context(ctx), args)
}

/// Native subsystems plus the dev manager they share, for commands that
/// must wait for or stop dev sessions before exiting.
pub(crate) fn subsystems_with_dev() -> (Subsystems, Arc<DevSessionManager>) {
    let dev = Arc::new(DevSessionManager::new());
    (runtime::native_subsystems_with_dev(Arc::clone(&dev)), dev)
}

/// Forward selection flags (`--all`, names) to a reserved command.
pub(crate) fn selection_args(names: &[String], all: bool) -> Vec<String> {
    let mut args = names.to_vec();
    if all {
        args.push("--all".to_string());
    }
    args
}

pub mod build;
pub mod deploy;
pub mod dev;
pub mod exec;
pub mod logs;
pub mod run;
pub mod upgrade;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (stevedore::Result<serde_json::Value>, i32) {
    crate::tty::status("stevedore is working...");

    match command {
        crate::Commands::Run(args) => dispatch!(args, global, run),
        crate::Commands::Build(args) => dispatch!(args, global, build),
        crate::Commands::Deploy(args) => dispatch!(args, global, deploy),
        crate::Commands::Dev(args) => dispatch!(args, global, dev),
        crate::Commands::Logs(args) => dispatch!(args, global, logs),
        crate::Commands::Upgrade(args) | crate::Commands::Update(args) => {
            dispatch!(args, global, upgrade)
        }

        // Raw output mode
        crate::Commands::Exec(_) => {
            let err = stevedore::Error::validation_invalid_argument(
                "output_mode",
                "Exec command uses raw output mode",
                None,
                None,
            );
            crate::output::map_cmd_result_to_json::<serde_json::Value>(Err(err))
        }
    }
}
