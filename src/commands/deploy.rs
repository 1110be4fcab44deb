use clap::Args;
use serde::Serialize;
use stevedore::engine::ReservedCommand;
use stevedore::runtime;

use crate::commands::{run_reduced, selection_args, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct DeployArgs {
    /// Deployments to apply
    pub deployments: Vec<String>,

    /// Apply every configured deployment
    #[arg(long)]
    pub all: bool,

    /// Print the manifests instead of applying them
    #[arg(long)]
    pub render: bool,
}

#[derive(Serialize)]
pub struct DeployOutput {
    pub command: String,
    pub deployments: Vec<String>,
    pub rendered: bool,
}

pub fn run(args: DeployArgs, global: &GlobalArgs) -> CmdResult<DeployOutput> {
    let ctx = global.context(false)?;

    let mut forwarded = selection_args(&args.deployments, args.all);
    if args.render {
        forwarded.push("--render".to_string());
    }

    run_reduced(
        &ctx,
        runtime::native_subsystems(),
        ReservedCommand::Deploy,
        &forwarded,
    )?;

    let deployments = if args.all {
        ctx.config().deployments.keys().cloned().collect()
    } else {
        args.deployments
    };
    Ok((
        DeployOutput {
            command: "deploy".to_string(),
            deployments,
            rendered: args.render,
        },
        0,
    ))
}
