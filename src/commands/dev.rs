use clap::Args;
use serde::Serialize;
use stevedore::engine::{DevManager, ReservedCommand};
use stevedore::log_status;

use crate::commands::{run_reduced, selection_args, subsystems_with_dev, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct DevArgs {
    /// Dev sessions to start
    pub sessions: Vec<String>,

    /// Start every configured dev session
    #[arg(long)]
    pub all: bool,
}

#[derive(Serialize)]
pub struct DevOutput {
    pub command: String,
    pub sessions: Vec<String>,
}

/// Start dev sessions and block until they all exit.
pub fn run(args: DevArgs, global: &GlobalArgs) -> CmdResult<DevOutput> {
    let ctx = global.context(false)?;
    let (subsystems, dev) = subsystems_with_dev();

    let forwarded = selection_args(&args.sessions, args.all);
    if let Err(err) = run_reduced(&ctx, subsystems, ReservedCommand::Dev, &forwarded) {
        dev.stop_all();
        return Err(err);
    }

    let sessions = dev.running();
    log_status!("dev", "Running dev sessions: {}", sessions.join(", "));
    dev.wait_all();

    Ok((
        DevOutput {
            command: "dev".to_string(),
            sessions,
        },
        0,
    ))
}
