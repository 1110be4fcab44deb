use clap::Args;
use stevedore::logs::{self, LogContent, LogsOptions, DEFAULT_LINES};

use crate::commands::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct LogsArgs {
    /// Pod to read logs from
    #[arg(long)]
    pub pod: Option<String>,

    /// Label selector matching the pods to read logs from
    #[arg(short = 'l', long)]
    pub label_selector: Option<String>,

    /// Container within the pod
    #[arg(short = 'c', long)]
    pub container: Option<String>,

    /// Namespace of the pod
    #[arg(short = 'n', long)]
    pub namespace: Option<String>,

    /// Number of lines to show
    #[arg(long, default_value_t = DEFAULT_LINES)]
    pub lines: u32,

    /// Follow log output
    #[arg(short, long)]
    pub follow: bool,
}

pub fn is_interactive(args: &LogsArgs) -> bool {
    args.follow
}

fn options(args: &LogsArgs) -> LogsOptions {
    LogsOptions {
        pod: args.pod.clone(),
        label_selector: args.label_selector.clone(),
        container: args.container.clone(),
        namespace: args.namespace.clone(),
        lines: args.lines,
        follow: args.follow,
    }
}

pub fn run(args: LogsArgs, global: &GlobalArgs) -> CmdResult<LogContent> {
    let ctx = global.context(false)?;
    let content = logs::show(&ctx, &options(&args))?;
    Ok((content, 0))
}

/// Stream logs straight to the terminal. Returns kubectl's exit code.
pub fn follow(args: LogsArgs, global: &GlobalArgs) -> stevedore::Result<i32> {
    let ctx = global.context(true)?;
    logs::follow(&ctx, &options(&args))
}
