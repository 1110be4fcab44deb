use std::thread;

use serde::Serialize;

use crate::context::ExecutionContext;
use crate::engine::{Engine, HandlerContext, PipelineRunner, Subsystems};
use crate::error::{Error, Result};
use crate::script;
use crate::utils::args::ArgSpec;

const RUN_PIPELINES_ARGS: ArgSpec<'static> = ArgSpec {
    command: "run_pipelines",
    switches: &["sequential"],
    options: &[],
};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineRunStatus {
    Success,
    PartialSuccess,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub name: String,
    pub status: PipelineRunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<crate::error::Hint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRunResult {
    pub pipelines: Vec<PipelineResult>,
    pub status: PipelineRunStatus,
    pub summary: PipelineRunSummary,
    /// First failure, kept for callers that need a single error.
    #[serde(skip)]
    pub first_error: Option<Error>,
}

/// Run one pipeline's script in pipeline mode.
///
/// The script's commands inherit `ctx`'s directory, environment and
/// cancellation; its output goes to `ctx`'s logger.
pub fn run_pipeline(ctx: &ExecutionContext, subsystems: &Subsystems, name: &str) -> Result<()> {
    let pipeline = ctx.config().pipeline(name)?;
    ctx.log().debug(format!("Run pipeline {}", name));

    let engine = Engine::pipeline(ctx.clone(), subsystems.clone());
    let status = script::run(&engine, &pipeline.run, HandlerContext::from_context(ctx))?;

    if status.success() {
        ctx.log().debug(format!("Pipeline {} done", name));
        Ok(())
    } else {
        Err(Error::pipeline_failed(name, status.code()))
    }
}

/// Run several pipelines, concurrently unless `sequential`.
///
/// Names are validated before anything starts. In sequential mode the
/// first failure skips the remaining pipelines.
pub fn run_pipelines(
    ctx: &ExecutionContext,
    subsystems: &Subsystems,
    names: &[String],
    sequential: bool,
) -> Result<PipelineRunResult> {
    if names.is_empty() {
        return Err(Error::validation_missing_argument(vec![
            "<pipeline>...".to_string()
        ]));
    }
    for name in names {
        ctx.config().pipeline(name)?;
    }

    let outcomes: Vec<(String, Option<Result<()>>)> = if sequential || names.len() == 1 {
        let mut outcomes = Vec::with_capacity(names.len());
        let mut failed = false;
        for name in names {
            if failed {
                outcomes.push((name.clone(), None));
                continue;
            }
            let result = run_pipeline(ctx, subsystems, name);
            failed = result.is_err();
            outcomes.push((name.clone(), Some(result)));
        }
        outcomes
    } else {
        execute_batch(ctx, subsystems, names)
    };

    Ok(collect_results(outcomes))
}

fn execute_batch(
    ctx: &ExecutionContext,
    subsystems: &Subsystems,
    names: &[String],
) -> Vec<(String, Option<Result<()>>)> {
    let handles: Vec<_> = names
        .iter()
        .map(|name| {
            let ctx = ctx.clone();
            let subsystems = subsystems.clone();
            let name = name.clone();
            thread::spawn(move || run_pipeline(&ctx, &subsystems, &name))
        })
        .collect();

    names
        .iter()
        .zip(handles)
        .map(|(name, handle)| {
            let result = handle.join().unwrap_or_else(|_| {
                Err(Error::internal_unexpected(format!(
                    "pipeline {} panicked",
                    name
                )))
            });
            (name.clone(), Some(result))
        })
        .collect()
}

fn collect_results(outcomes: Vec<(String, Option<Result<()>>)>) -> PipelineRunResult {
    let mut pipelines = Vec::with_capacity(outcomes.len());
    let mut first_error = None;

    for (name, outcome) in outcomes {
        let result = match outcome {
            None => PipelineResult {
                name,
                status: PipelineRunStatus::Skipped,
                error: None,
                hints: Vec::new(),
            },
            Some(Ok(())) => PipelineResult {
                name,
                status: PipelineRunStatus::Success,
                error: None,
                hints: Vec::new(),
            },
            Some(Err(err)) => {
                let result = PipelineResult {
                    name,
                    status: PipelineRunStatus::Failed,
                    error: Some(err.message.clone()),
                    hints: err.hints.clone(),
                };
                first_error = first_error.or(Some(err));
                result
            }
        };
        pipelines.push(result);
    }

    let count = |status: PipelineRunStatus| pipelines.iter().filter(|p| p.status == status).count();
    let summary = PipelineRunSummary {
        total: pipelines.len(),
        succeeded: count(PipelineRunStatus::Success),
        failed: count(PipelineRunStatus::Failed),
        skipped: count(PipelineRunStatus::Skipped),
    };

    let status = match (summary.failed, summary.succeeded) {
        (0, _) => PipelineRunStatus::Success,
        (_, 0) => PipelineRunStatus::Failed,
        _ => PipelineRunStatus::PartialSuccess,
    };

    PipelineRunResult {
        pipelines,
        status,
        summary,
        first_error,
    }
}

/// `run_pipelines` implementation. Holds no state, so nested
/// `run_pipelines` calls from inside a pipeline are safe.
pub struct PipelineManager;

impl PipelineRunner for PipelineManager {
    fn run_pipelines(
        &self,
        ctx: &ExecutionContext,
        subsystems: &Subsystems,
        args: &[String],
    ) -> Result<()> {
        let parsed = RUN_PIPELINES_ARGS.parse(args)?;
        let result = run_pipelines(
            ctx,
            subsystems,
            &parsed.positional,
            parsed.switch("sequential"),
        )?;

        match result.first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, ProjectConfig};
    use crate::context::test_support::context;
    use crate::log::{LogLevel, Logger, SharedBuffer};
    use crate::runtime;

    fn project(pipelines: &[(&str, &str)]) -> ProjectConfig {
        let mut config = ProjectConfig::default();
        for (name, run) in pipelines {
            config.pipelines.insert(
                name.to_string(),
                PipelineConfig {
                    run: run.to_string(),
                },
            );
        }
        config
    }

    #[test]
    fn pipeline_output_goes_to_logger() {
        let dir = tempfile::tempdir().unwrap();
        let out = SharedBuffer::new();
        let ctx = context(
            project(&[("hello", "echo hello\necho world")]),
            dir.path(),
            Logger::stream(out.writer(), LogLevel::Info),
        );

        run_pipeline(&ctx, &runtime::native_subsystems(), "hello").unwrap();
        assert_eq!(out.contents(), "hello\nworld\n");
    }

    #[test]
    fn failing_script_fails_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(project(&[("broken", "exit 4")]), dir.path(), Logger::discard());

        let err = run_pipeline(&ctx, &runtime::native_subsystems(), "broken").unwrap_err();
        assert_eq!(err.message, "pipeline broken failed: exit status 4");
    }

    #[test]
    fn unknown_pipeline_fails_before_running_anything() {
        let dir = tempfile::tempdir().unwrap();
        let out = SharedBuffer::new();
        let ctx = context(
            project(&[("ok", "echo ran")]),
            dir.path(),
            Logger::stream(out.writer(), LogLevel::Info),
        );

        let names = vec!["ok".to_string(), "ghost".to_string()];
        let err = run_pipelines(&ctx, &runtime::native_subsystems(), &names, false).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::PipelineNotFound);
        assert_eq!(out.contents(), "");
    }

    #[test]
    fn sequential_failure_skips_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            project(&[("a", "exit 1"), ("b", "echo b")]),
            dir.path(),
            Logger::discard(),
        );

        let names = vec!["a".to_string(), "b".to_string()];
        let result = run_pipelines(&ctx, &runtime::native_subsystems(), &names, true).unwrap();
        assert_eq!(result.status, PipelineRunStatus::Failed);
        assert_eq!(result.pipelines[1].status, PipelineRunStatus::Skipped);
        assert_eq!(result.summary.skipped, 1);
    }

    #[test]
    fn parallel_runs_report_partial_success() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            project(&[("a", "exit 1"), ("b", "echo b")]),
            dir.path(),
            Logger::discard(),
        );

        let names = vec!["a".to_string(), "b".to_string()];
        let result = run_pipelines(&ctx, &runtime::native_subsystems(), &names, false).unwrap();
        assert_eq!(result.status, PipelineRunStatus::PartialSuccess);
        assert_eq!(result.summary.succeeded, 1);
        assert_eq!(result.summary.failed, 1);
        assert!(result.first_error.is_some());
    }

    #[test]
    fn run_pipelines_is_reentrant() {
        let dir = tempfile::tempdir().unwrap();
        let out = SharedBuffer::new();
        let ctx = context(
            project(&[
                ("all", "run_pipelines one two --sequential"),
                ("one", "echo one"),
                ("two", "echo two"),
            ]),
            dir.path(),
            Logger::stream(out.writer(), LogLevel::Info),
        );

        run_pipeline(&ctx, &runtime::native_subsystems(), "all").unwrap();
        assert_eq!(out.contents(), "one\ntwo\n");
    }

    #[test]
    fn dev_sessions_outlive_the_script_that_started_them() {
        use crate::config::DevConfig;
        use crate::dev::DevSessionManager;
        use crate::engine::DevManager;
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let mut config = project(&[
            ("foreground", "start_dev api"),
            ("background", "start_dev web &\nwait"),
        ]);
        for name in ["api", "web"] {
            config.dev.insert(
                name.to_string(),
                DevConfig {
                    command: "sleep 30".to_string(),
                    ..Default::default()
                },
            );
        }
        let ctx = context(config, dir.path(), Logger::discard());
        let dev = Arc::new(DevSessionManager::new().with_logger(Logger::discard()));
        let subsystems = runtime::native_subsystems_with_dev(Arc::clone(&dev));

        run_pipeline(&ctx, &subsystems, "foreground").unwrap();
        run_pipeline(&ctx, &subsystems, "background").unwrap();
        assert_eq!(dev.running(), vec!["api", "web"]);

        dev.stop_all();
        assert!(dev.running().is_empty());
    }
}
