//! Dependencies: other stevedore projects a project can run pipelines in.
//!
//! `run_dependencies_pipeline` loads each dependency's config once (cached
//! per resolved directory), orders them by `depends_on`, and runs the
//! chosen pipeline inside each dependency's directory.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::config::{self, DependencyConfig, ProjectConfig};
use crate::context::ExecutionContext;
use crate::engine::{DependencyRunner, Subsystems};
use crate::error::{Error, Result};
use crate::paths;
use crate::pipeline;
use crate::utils::args::ArgSpec;

pub const DEFAULT_DEPENDENCY_PIPELINE: &str = "deploy";

const RUN_DEPENDENCIES_ARGS: ArgSpec<'static> = ArgSpec {
    command: "run_dependencies_pipeline",
    switches: &["all"],
    options: &["pipeline"],
};

#[derive(Debug, Clone)]
pub struct ResolvedDependency {
    pub name: String,
    pub dir: PathBuf,
    pub config: Arc<ProjectConfig>,
}

#[derive(Default)]
pub struct DependencyRegistry {
    projects: RwLock<HashMap<PathBuf, Arc<ProjectConfig>>>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load (or reuse) the config of dependency `name` declared in a
    /// project rooted at `base_dir`.
    pub fn resolve(
        &self,
        base_dir: &Path,
        name: &str,
        dependency: &DependencyConfig,
    ) -> Result<ResolvedDependency> {
        let dir = paths::resolve_in(base_dir, &dependency.path);

        let cached = self
            .projects
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&dir)
            .cloned();

        let config = match cached {
            Some(config) => config,
            None => {
                let loaded = config::load_file(&dir.join(paths::PROJECT_CONFIG_FILE)).map_err(|e| {
                    e.prefixed(&format!("dependency {}", name))
                        .with_hint(format!("Check dependencies.{}.path", name))
                })?;
                let mut projects = self.projects.write().unwrap_or_else(|p| p.into_inner());
                Arc::clone(
                    projects
                        .entry(dir.clone())
                        .or_insert_with(|| Arc::new(loaded)),
                )
            }
        };

        Ok(ResolvedDependency {
            name: name.to_string(),
            dir,
            config,
        })
    }

    pub fn cached_count(&self) -> usize {
        self.projects.read().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// Order `selected` dependencies and everything they depend on so each
/// one comes after its `depends_on` entries. Ties keep name order.
pub fn order_dependencies(
    dependencies: &BTreeMap<String, DependencyConfig>,
    selected: &[String],
) -> Result<Vec<String>> {
    let mut included = BTreeSet::new();
    let mut stack: Vec<String> = selected.to_vec();
    while let Some(name) = stack.pop() {
        if !included.insert(name.clone()) {
            continue;
        }
        let dependency = dependencies
            .get(&name)
            .ok_or_else(|| Error::dependency_not_found(name.clone()))?;
        stack.extend(dependency.depends_on.iter().cloned());
    }

    let names: Vec<&String> = included.iter().collect();
    let index: HashMap<&str, usize> = names
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();

    let mut indegree = vec![0usize; names.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
    for (idx, name) in names.iter().enumerate() {
        for need in &dependencies[name.as_str()].depends_on {
            let parent = index.get(need.as_str()).copied().ok_or_else(|| {
                Error::validation_invalid_argument(
                    "dependencies",
                    format!("Dependency '{}' depends on unknown dependency '{}'", name, need),
                    None,
                    None,
                )
            })?;
            indegree[idx] += 1;
            dependents[parent].push(idx);
        }
    }

    let mut queue: VecDeque<usize> = (0..names.len()).filter(|&i| indegree[i] == 0).collect();
    let mut ordered = Vec::with_capacity(names.len());
    while let Some(idx) = queue.pop_front() {
        ordered.push(names[idx].clone());
        for &child in &dependents[idx] {
            indegree[child] -= 1;
            if indegree[child] == 0 {
                queue.push_back(child);
            }
        }
    }

    if ordered.len() != names.len() {
        let pending: Vec<String> = names
            .iter()
            .enumerate()
            .filter(|(idx, _)| indegree[*idx] > 0)
            .map(|(_, name)| (*name).clone())
            .collect();
        return Err(Error::validation_invalid_argument(
            "dependencies",
            "Dependencies contain a cycle",
            None,
            Some(pending),
        ));
    }

    Ok(ordered)
}

impl DependencyRunner for DependencyRegistry {
    fn run_dependencies_pipeline(
        &self,
        ctx: &ExecutionContext,
        subsystems: &Subsystems,
        args: &[String],
    ) -> Result<()> {
        let parsed = RUN_DEPENDENCIES_ARGS.parse(args)?;
        let dependencies = &ctx.config().dependencies;

        let selected: Vec<String> = if parsed.switch("all") {
            dependencies.keys().cloned().collect()
        } else if parsed.positional.is_empty() {
            return Err(Error::validation_missing_argument(vec![
                "<dependency>...".to_string(),
                "--all".to_string(),
            ]));
        } else {
            parsed.positional.clone()
        };

        let pipeline_override = parsed.option("pipeline");
        for name in order_dependencies(dependencies, &selected)? {
            ctx.check_cancelled()?;

            let dependency = ctx.config().dependency(&name)?;
            let resolved = self.resolve(ctx.working_dir(), &name, dependency)?;
            let pipeline_name = pipeline_override
                .or(dependency.pipeline.as_deref())
                .unwrap_or(DEFAULT_DEPENDENCY_PIPELINE);

            ctx.log().info(format!(
                "Run pipeline {} of dependency {}",
                pipeline_name, name
            ));

            let dep_ctx = ctx
                .with_config(Arc::clone(&resolved.config))
                .with_working_dir(resolved.dir.clone());
            pipeline::run_pipeline(&dep_ctx, subsystems, pipeline_name)
                .map_err(|e| e.prefixed(&format!("dependency {}", name)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::context;
    use crate::log::{LogLevel, Logger, SharedBuffer};
    use crate::runtime;

    fn dependency(path: &str, depends_on: &[&str]) -> DependencyConfig {
        DependencyConfig {
            path: path.to_string(),
            pipeline: None,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn orders_transitive_dependencies_first() {
        let mut deps = BTreeMap::new();
        deps.insert("web".to_string(), dependency("../web", &["api"]));
        deps.insert("api".to_string(), dependency("../api", &["db"]));
        deps.insert("db".to_string(), dependency("../db", &[]));
        deps.insert("unrelated".to_string(), dependency("../x", &[]));

        let ordered = order_dependencies(&deps, &["web".to_string()]).unwrap();
        assert_eq!(ordered, vec!["db", "api", "web"]);
    }

    #[test]
    fn detects_cycles() {
        let mut deps = BTreeMap::new();
        deps.insert("a".to_string(), dependency("../a", &["b"]));
        deps.insert("b".to_string(), dependency("../b", &["a"]));

        let err = order_dependencies(&deps, &["a".to_string()]).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ValidationInvalidArgument);
        assert!(err.message.contains("cycle"));
    }

    #[test]
    fn unknown_dependency_is_not_found() {
        let err = order_dependencies(&BTreeMap::new(), &["ghost".to_string()]).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::DependencyNotFound);
    }

    #[test]
    fn runs_dependency_pipeline_in_its_directory() {
        let root = tempfile::tempdir().unwrap();
        let app = root.path().join("app");
        let auth = root.path().join("auth");
        std::fs::create_dir_all(&app).unwrap();
        std::fs::create_dir_all(&auth).unwrap();
        std::fs::write(
            auth.join("stevedore.yaml"),
            "pipelines:\n  deploy:\n    run: echo deployed auth\n  seed:\n    run: echo seeded auth\n",
        )
        .unwrap();

        let mut config = ProjectConfig::default();
        config
            .dependencies
            .insert("auth".to_string(), dependency("../auth", &[]));

        let out = SharedBuffer::new();
        let ctx = context(config, &app, Logger::stream(out.writer(), LogLevel::Info));
        let registry = DependencyRegistry::new();
        let subsystems = runtime::native_subsystems();

        registry
            .run_dependencies_pipeline(&ctx, &subsystems, &["--all".to_string()])
            .unwrap();
        registry
            .run_dependencies_pipeline(
                &ctx,
                &subsystems,
                &["auth".to_string(), "--pipeline".to_string(), "seed".to_string()],
            )
            .unwrap();

        let output = out.contents();
        assert!(output.contains("deployed auth"));
        assert!(output.contains("seeded auth"));
        assert_eq!(registry.cached_count(), 1);
    }

    #[test]
    fn requires_names_or_all() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(ProjectConfig::default(), dir.path(), Logger::discard());
        let err = DependencyRegistry::new()
            .run_dependencies_pipeline(&ctx, &runtime::native_subsystems(), &[])
            .unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ValidationMissingArgument);
    }
}
