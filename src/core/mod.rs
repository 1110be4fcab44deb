// Public modules
pub mod build;
pub mod config;
pub mod context;
pub mod dependency;
pub mod deploy;
pub mod dev;
pub mod download;
pub mod engine;
pub mod error;
pub mod log;
pub mod logs;
pub mod pipeline;
pub mod runtime;
pub mod script;
pub mod upgrade;

// Internal modules - not part of public API
pub(crate) mod paths;

// Public modules for CLI access
pub mod defaults;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
