use clap::Args;
use serde::Serialize;
use stevedore::engine::ReservedCommand;
use stevedore::runtime;

use crate::commands::{run_reduced, selection_args, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct BuildArgs {
    /// Images to build
    pub images: Vec<String>,

    /// Build every configured image
    #[arg(long)]
    pub all: bool,

    /// Tag to build (repeatable, replaces configured tags)
    #[arg(long)]
    pub tag: Vec<String>,

    /// Build without pushing
    #[arg(long)]
    pub skip_push: bool,

    /// Build without the docker layer cache
    #[arg(long)]
    pub force_rebuild: bool,
}

#[derive(Serialize)]
pub struct BuildOutput {
    pub command: String,
    pub images: Vec<String>,
}

pub fn run(args: BuildArgs, global: &GlobalArgs) -> CmdResult<BuildOutput> {
    let ctx = global.context(false)?;

    let mut forwarded = selection_args(&args.images, args.all);
    for tag in &args.tag {
        forwarded.push("--tag".to_string());
        forwarded.push(tag.clone());
    }
    if args.skip_push {
        forwarded.push("--skip-push".to_string());
    }
    if args.force_rebuild {
        forwarded.push("--force-rebuild".to_string());
    }

    run_reduced(
        &ctx,
        runtime::native_subsystems(),
        ReservedCommand::Build,
        &forwarded,
    )?;

    let images = if args.all {
        ctx.config().images.keys().cloned().collect()
    } else {
        args.images
    };
    Ok((
        BuildOutput {
            command: "build".to_string(),
            images,
        },
        0,
    ))
}
