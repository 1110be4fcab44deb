//! Reserved commands and their routing to subsystems.
//!
//! Two fixed tables exist:
//! - full: the pipeline commands, only valid while a pipeline runs
//! - reduced: `build`, `deploy` and `dev`, valid anywhere
//!
//! The set is closed: adding a reserved command means adding a variant
//! here, never registering one at runtime.

use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::log::write_line;

use super::context_builder;
use super::exit;
use super::invocation::{ExitStatus, HandlerContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedCommand {
    RunPipelines,
    BuildImages,
    CreateDeployments,
    StartDev,
    StopDev,
    RunDependenciesPipeline,
    Build,
    Deploy,
    Dev,
}

impl ReservedCommand {
    pub const fn name(self) -> &'static str {
        match self {
            ReservedCommand::RunPipelines => "run_pipelines",
            ReservedCommand::BuildImages => "build_images",
            ReservedCommand::CreateDeployments => "create_deployments",
            ReservedCommand::StartDev => "start_dev",
            ReservedCommand::StopDev => "stop_dev",
            ReservedCommand::RunDependenciesPipeline => "run_dependencies_pipeline",
            ReservedCommand::Build => "build",
            ReservedCommand::Deploy => "deploy",
            ReservedCommand::Dev => "dev",
        }
    }
}

const FULL: &[ReservedCommand] = &[
    ReservedCommand::RunPipelines,
    ReservedCommand::BuildImages,
    ReservedCommand::CreateDeployments,
    ReservedCommand::StartDev,
    ReservedCommand::StopDev,
    ReservedCommand::RunDependenciesPipeline,
];

const REDUCED: &[ReservedCommand] = &[
    ReservedCommand::Build,
    ReservedCommand::Deploy,
    ReservedCommand::Dev,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTable {
    commands: &'static [ReservedCommand],
    gated: bool,
}

impl CommandTable {
    /// Pipeline commands, rejected outside pipeline mode.
    pub const fn full() -> Self {
        Self {
            commands: FULL,
            gated: true,
        }
    }

    /// Ungated `build` / `deploy` / `dev`.
    pub const fn reduced() -> Self {
        Self {
            commands: REDUCED,
            gated: false,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<ReservedCommand> {
        self.commands.iter().copied().find(|c| c.name() == name)
    }

    pub fn commands(&self) -> &'static [ReservedCommand] {
        self.commands
    }

    pub fn is_gated(&self) -> bool {
        self.gated
    }
}

pub trait PipelineRunner: Send + Sync {
    /// `run_pipelines <name>... [--sequential]`
    fn run_pipelines(
        &self,
        ctx: &ExecutionContext,
        subsystems: &Subsystems,
        args: &[String],
    ) -> Result<()>;
}

pub trait ImageBuilder: Send + Sync {
    fn build_images(&self, ctx: &ExecutionContext, args: &[String]) -> Result<()>;
}

pub trait Deployer: Send + Sync {
    fn create_deployments(&self, ctx: &ExecutionContext, args: &[String]) -> Result<()>;
}

pub trait DevManager: Send + Sync {
    fn start_dev(&self, ctx: &ExecutionContext, args: &[String]) -> Result<()>;
    fn stop_dev(&self, ctx: &ExecutionContext, args: &[String]) -> Result<()>;

    /// Block until every running session has exited.
    fn wait_all(&self);

    fn stop_all(&self);
}

pub trait DependencyRunner: Send + Sync {
    fn run_dependencies_pipeline(
        &self,
        ctx: &ExecutionContext,
        subsystems: &Subsystems,
        args: &[String],
    ) -> Result<()>;
}

/// The subsystems reserved commands are routed to.
#[derive(Clone)]
pub struct Subsystems {
    pub pipelines: Arc<dyn PipelineRunner>,
    pub images: Arc<dyn ImageBuilder>,
    pub deployments: Arc<dyn Deployer>,
    pub dev: Arc<dyn DevManager>,
    pub dependencies: Arc<dyn DependencyRunner>,
}

pub struct Dispatcher {
    table: CommandTable,
    pipeline_mode: bool,
    subsystems: Subsystems,
}

impl Dispatcher {
    pub fn new(table: CommandTable, pipeline_mode: bool, subsystems: Subsystems) -> Self {
        Self {
            table,
            pipeline_mode,
            subsystems,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<ReservedCommand> {
        self.table.lookup(name)
    }

    pub fn subsystems(&self) -> &Subsystems {
        &self.subsystems
    }

    /// Run a reserved command and report its exit status.
    ///
    /// In a gated table outside pipeline mode the command is rejected
    /// before a context is derived or any subsystem is touched.
    pub fn invoke(
        &self,
        ambient: &ExecutionContext,
        command: ReservedCommand,
        hc: &HandlerContext,
        args: &[String],
    ) -> ExitStatus {
        if self.table.is_gated() && !self.pipeline_mode {
            write_line(
                &hc.stderr,
                format_args!(
                    "{}: cannot execute the command because it can only be executed within a pipeline step",
                    command.name()
                ),
            );
            return ExitStatus::FAILURE;
        }

        let result = self.call(ambient, command, hc, args);
        exit::translate(command.name(), result, &hc.stderr)
    }

    /// Route a reserved command to its subsystem without the gate check or
    /// exit translation.
    pub fn call(
        &self,
        ambient: &ExecutionContext,
        command: ReservedCommand,
        hc: &HandlerContext,
        args: &[String],
    ) -> Result<()> {
        let ctx = context_builder::derive(ambient, hc);
        ctx.log()
            .debug(format!("{} {}", command.name(), args.join(" ")).trim_end());

        let s = &self.subsystems;
        match command {
            ReservedCommand::RunPipelines => s.pipelines.run_pipelines(&ctx, s, args),
            ReservedCommand::BuildImages | ReservedCommand::Build => {
                s.images.build_images(&ctx, args)
            }
            ReservedCommand::CreateDeployments | ReservedCommand::Deploy => {
                s.deployments.create_deployments(&ctx, args)
            }
            ReservedCommand::StartDev | ReservedCommand::Dev => s.dev.start_dev(&ctx, args),
            ReservedCommand::StopDev => s.dev.stop_dev(&ctx, args),
            ReservedCommand::RunDependenciesPipeline => {
                s.dependencies.run_dependencies_pipeline(&ctx, s, args)
            }
        }
    }
}
