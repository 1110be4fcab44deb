use clap::Args;
use stevedore::upgrade::{self, VersionCheck};

use crate::commands::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct UpgradeArgs {
    /// Check for updates (the only supported mode)
    #[arg(long)]
    pub check: bool,
}

pub fn run(args: UpgradeArgs, _global: &GlobalArgs) -> CmdResult<VersionCheck> {
    if !args.check {
        return Err(stevedore::Error::validation_invalid_argument(
            "check",
            "Self-install is not supported; download releases from GitHub",
            None,
            None,
        )
        .with_hint("Check for a newer version: stevedore upgrade --check"));
    }
    let result = upgrade::check_for_updates()?;
    Ok((result, 0))
}
