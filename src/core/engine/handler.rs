use std::sync::Arc;
use std::time::Duration;

use crate::context::ExecutionContext;
use crate::error::Result;

use super::dispatcher::{CommandTable, Dispatcher, Subsystems};
use super::exec;
use super::fallback::{BuiltinFallback, FallbackProvider};
use super::invocation::{ExitStatus, HandlerContext};
use super::resolver::{ResolutionOutcome, Resolver};

/// Hook the interpreter calls for every simple command.
///
/// `args[0]` is the command name. An `Err` means the handler itself broke
/// (not that the command failed) and aborts the script.
pub trait ExecHandler: Send + Sync {
    fn exec(&self, hc: &HandlerContext, args: &[String]) -> Result<ExitStatus>;
}

/// The stevedore exec handler: reserved commands, fallbacks, then
/// ordinary process execution.
pub struct Engine {
    ctx: ExecutionContext,
    resolver: Resolver,
    kill_grace: Duration,
}

impl Engine {
    pub fn new(
        ctx: ExecutionContext,
        subsystems: Subsystems,
        table: CommandTable,
        pipeline_mode: bool,
    ) -> Self {
        let fallback: Arc<dyn FallbackProvider> =
            Arc::new(BuiltinFallback::new(Arc::clone(ctx.tools())));
        let kill_grace = ctx.defaults().exec.kill_grace();
        Self {
            resolver: Resolver::new(Dispatcher::new(table, pipeline_mode, subsystems), fallback),
            ctx,
            kill_grace,
        }
    }

    /// Engine for a pipeline step: full table, pipeline mode on.
    pub fn pipeline(ctx: ExecutionContext, subsystems: Subsystems) -> Self {
        Self::new(ctx, subsystems, CommandTable::full(), true)
    }

    /// Engine for scripts outside any pipeline: full table, gated off.
    pub fn ad_hoc(ctx: ExecutionContext, subsystems: Subsystems) -> Self {
        Self::new(ctx, subsystems, CommandTable::full(), false)
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackProvider>) -> Self {
        self.resolver.fallback = fallback;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn resolve(&self, hc: &HandlerContext, name: &str, args: &[String]) -> ResolutionOutcome {
        self.resolver.resolve(&self.ctx, hc, name, args)
    }
}

impl ExecHandler for Engine {
    fn exec(&self, hc: &HandlerContext, args: &[String]) -> Result<ExitStatus> {
        let Some((name, rest)) = args.split_first() else {
            return exec::default_exec(hc, "", &[], self.kill_grace);
        };

        match self.resolve(hc, name, rest) {
            ResolutionOutcome::Handled(status) => Ok(status),
            ResolutionOutcome::NotReserved { program } => {
                exec::default_exec(hc, &program, rest, self.kill_grace)
            }
        }
    }
}
