//! Command interception for pipeline scripts.
//!
//! Every simple command the script interpreter is about to run passes
//! through an [`ExecHandler`]. The engine's handler:
//! - `dispatcher` - Closed table of reserved commands, pipeline-mode gate
//! - `context_builder` - Per-invocation views of the ambient context
//! - `resolver` - Reserved lookup, PATH lookup, fallback provider
//! - `fallback` - Built-in `cat`, downloaded kubectl/helm, self-invocation
//! - `exec` - Default process execution with graceful termination
//! - `exit` - Subsystem result to exit status translation

pub mod cat;
pub mod context_builder;
pub mod dispatcher;
pub mod exec;
pub mod exit;
pub mod fallback;
pub mod handler;
pub mod invocation;
pub mod resolver;

pub use dispatcher::{
    CommandTable, DependencyRunner, Deployer, DevManager, Dispatcher, ImageBuilder,
    PipelineRunner, ReservedCommand, Subsystems,
};
pub use handler::{Engine, ExecHandler};
pub use invocation::{ExitStatus, HandlerContext, Input};
pub use resolver::ResolutionOutcome;
