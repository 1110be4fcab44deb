use clap::Args;
use stevedore::engine::DevManager;
use stevedore::pipeline::{self, PipelineRunResult, PipelineRunStatus};
use stevedore::{log_status, upgrade};

use crate::commands::{subsystems_with_dev, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct RunArgs {
    /// Pipelines to run (concurrently unless --sequential)
    #[arg(required = true)]
    pub pipelines: Vec<String>,

    /// Run pipelines one after another, stopping at the first failure
    #[arg(long)]
    pub sequential: bool,
}

pub fn run(args: RunArgs, global: &GlobalArgs) -> CmdResult<PipelineRunResult> {
    let ctx = global.context(false)?;
    let (subsystems, dev) = subsystems_with_dev();

    let result = pipeline::run_pipelines(&ctx, &subsystems, &args.pipelines, args.sequential);

    let result = match result {
        Ok(result) => result,
        Err(err) => {
            dev.stop_all();
            return Err(err);
        }
    };

    let exit_code = match (&result.status, &result.first_error) {
        (PipelineRunStatus::Success, _) => {
            let running = dev.running();
            if !running.is_empty() {
                log_status!("dev", "Waiting for dev sessions: {}", running.join(", "));
            }
            dev.wait_all();
            0
        }
        (_, Some(err)) => {
            dev.stop_all();
            crate::output::exit_code_for_error(err.code)
        }
        (_, None) => {
            dev.stop_all();
            1
        }
    };

    upgrade::print_upgrade_message(ctx.log());
    Ok((result, exit_code))
}
