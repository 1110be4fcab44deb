use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::GlobalArgs;

#[derive(Debug, Clone, Copy)]
enum ResponseMode {
    Json,
    Raw,
}

mod commands;
mod output;
mod tty;

use commands::{build, deploy, dev, exec, logs, run, upgrade};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "stevedore")]
#[command(version = VERSION)]
#[command(about = "Pipeline-driven build, deploy and dev-session orchestrator")]
struct Cli {
    /// Log debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Project config file (default: stevedore.yaml, or $STEVEDORE_CONFIG)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pipelines
    Run(run::RunArgs),
    /// Run a script or command outside any pipeline
    Exec(exec::ExecArgs),
    /// Build and push images
    Build(build::BuildArgs),
    /// Apply deployments
    Deploy(deploy::DeployArgs),
    /// Start dev sessions and wait for them
    Dev(dev::DevArgs),
    /// Show pod logs
    Logs(logs::LogsArgs),
    /// Check for a newer stevedore release
    Upgrade(upgrade::UpgradeArgs),
    /// Alias for upgrade
    #[command(hide = true)]
    Update(upgrade::UpgradeArgs),
}

fn response_mode(command: &Commands) -> ResponseMode {
    match command {
        Commands::Exec(_) => ResponseMode::Raw,
        Commands::Logs(args) if logs::is_interactive(args) => ResponseMode::Raw,
        _ => ResponseMode::Json,
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs {
        debug: cli.debug,
        config: cli.config,
    };

    if let ResponseMode::Raw = response_mode(&cli.command) {
        let result = match cli.command {
            Commands::Exec(args) => exec::run(args, &global),
            Commands::Logs(args) => logs::follow(args, &global),
            _ => Ok(0),
        };
        let exit_code = match result {
            Ok(code) => code,
            Err(err) => {
                eprintln!("stevedore: {}", err);
                output::exit_code_for_error(err.code)
            }
        };
        return std::process::ExitCode::from(exit_code_to_u8(exit_code));
    }

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    let _ = output::print_json_result(json_result);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
