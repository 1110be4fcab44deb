//! `create_deployments`: kubectl apply for configured deployments.
//!
//! Each deploy records hashes of the rendered manifests and of the
//! deployment's configuration in `.stevedore/deploy-cache.json`. The
//! hashes are informational: every deploy applies with `--force`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{DeploymentConfig, KubectlConfig};
use crate::context::ExecutionContext;
use crate::download::ToolCommand;
use crate::engine::Deployer;
use crate::error::{Error, Result};
use crate::paths;
use crate::utils::args::{select, ArgSpec};
use crate::utils::io;

const CREATE_DEPLOYMENTS_ARGS: ArgSpec<'static> = ArgSpec {
    command: "create_deployments",
    switches: &["all", "render"],
    options: &[],
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentCacheEntry {
    pub manifests_hash: String,
    pub deployment_config_hash: String,
    pub deployed_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployCache {
    #[serde(default)]
    pub deployments: BTreeMap<String, DeploymentCacheEntry>,
}

impl DeployCache {
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = paths::deploy_cache(project_dir);
        match io::read_file_optional(&path, "read deploy cache")? {
            Some(content) => serde_json::from_str(&content).map_err(|e| {
                Error::internal_json(e.to_string(), Some(format!("parse {}", path.display())))
            }),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, project_dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            Error::internal_json(e.to_string(), Some("serialize deploy cache".to_string()))
        })?;
        io::write_file_atomic(
            &paths::deploy_cache(project_dir),
            &content,
            "write deploy cache",
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ManifestSource {
    File(PathBuf),
    Kustomization(PathBuf),
}

impl ManifestSource {
    fn apply_args(&self) -> [String; 2] {
        match self {
            ManifestSource::File(path) => ["-f".to_string(), path.to_string_lossy().to_string()],
            ManifestSource::Kustomization(dir) => {
                ["-k".to_string(), dir.to_string_lossy().to_string()]
            }
        }
    }

    fn hashed_file(&self) -> PathBuf {
        match self {
            ManifestSource::File(path) => path.clone(),
            ManifestSource::Kustomization(dir) => dir.join("kustomization.yaml"),
        }
    }
}

/// Expand manifest entries (paths or glob patterns) relative to `base`.
pub fn resolve_manifests(
    name: &str,
    kubectl: &KubectlConfig,
    base: &Path,
) -> Result<Vec<ManifestSource>> {
    if kubectl.manifests.is_empty() {
        return Err(Error::config_invalid_value(
            format!("deployments.{}.kubectl.manifests", name),
            None,
            format!("deployment '{}' lists no manifests", name),
        ));
    }

    let mut sources = Vec::new();
    for entry in &kubectl.manifests {
        let path = paths::resolve_in(base, entry);

        if kubectl.kustomize {
            if !path.is_dir() {
                return Err(Error::deploy_failed(
                    name,
                    format!("kustomization {} is not a directory", path.display()),
                ));
            }
            sources.push(ManifestSource::Kustomization(path));
            continue;
        }

        let pattern = path.to_string_lossy().to_string();
        let mut matched: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| {
                Error::config_invalid_value(
                    format!("deployments.{}.kubectl.manifests", name),
                    Some(entry.clone()),
                    format!("invalid manifest pattern: {}", e),
                )
            })?
            .filter_map(|p| p.ok())
            .filter(|p| p.is_file())
            .collect();

        if matched.is_empty() {
            return Err(Error::deploy_failed(
                name,
                format!("no manifests match {}", entry),
            ));
        }
        matched.sort();
        sources.extend(matched.into_iter().map(ManifestSource::File));
    }
    Ok(sources)
}

/// SHA-256 over every manifest's path and content, in order.
pub fn manifests_hash(sources: &[ManifestSource]) -> String {
    let mut hasher = Sha256::new();
    for source in sources {
        let file = source.hashed_file();
        hasher.update(file.to_string_lossy().as_bytes());
        hasher.update([0]);
        if let Ok(bytes) = fs::read(&file) {
            hasher.update(&bytes);
        }
        hasher.update([0]);
    }
    format!("{:x}", hasher.finalize())
}

pub fn deployment_config_hash(config: &DeploymentConfig) -> String {
    let encoded = serde_json::to_vec(config).unwrap_or_default();
    format!("{:x}", Sha256::digest(&encoded))
}

/// `kubectl` arguments applying `sources`.
pub fn kubectl_apply_args(
    deployment: &DeploymentConfig,
    kubectl: &KubectlConfig,
    sources: &[ManifestSource],
) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(namespace) = &deployment.namespace {
        args.push("--namespace".to_string());
        args.push(namespace.clone());
    }
    args.push("apply".to_string());
    args.push("--force".to_string());
    for source in sources {
        args.extend(source.apply_args());
    }
    args.extend(kubectl.apply_args.iter().cloned());
    args
}

fn render(ctx: &ExecutionContext, kubectl: &Path, sources: &[ManifestSource]) -> Result<()> {
    for source in sources {
        match source {
            ManifestSource::File(path) => {
                let content = io::read_file(path, &format!("read {}", path.display()))?;
                ctx.log().write_line("---");
                ctx.log().write_line(content.trim_end());
            }
            ManifestSource::Kustomization(dir) => {
                ctx.log().write_line("---");
                ctx.run_command(
                    kubectl,
                    &["kustomize".to_string(), dir.to_string_lossy().to_string()],
                )?;
            }
        }
    }
    Ok(())
}

pub fn deploy(
    ctx: &ExecutionContext,
    name: &str,
    deployment: &DeploymentConfig,
    cache: &mut DeployCache,
    render_only: bool,
) -> Result<()> {
    let kubectl = deployment.kubectl.as_ref().ok_or_else(|| {
        Error::config_invalid_value(
            format!("deployments.{}.kubectl", name),
            None,
            format!("deployment '{}' has no kubectl configuration", name),
        )
    })?;

    let sources = resolve_manifests(name, kubectl, ctx.working_dir())?;
    let kubectl_path = ctx.tools().ensure_command(ToolCommand::Kubectl)?;

    if render_only {
        return render(ctx, &kubectl_path, &sources);
    }

    let entry = DeploymentCacheEntry {
        manifests_hash: manifests_hash(&sources),
        deployment_config_hash: deployment_config_hash(deployment),
        deployed_at: chrono::Utc::now().to_rfc3339(),
    };

    // Always redeploy; the hashes only tell us whether anything changed.
    let changed = cache.deployments.get(name).is_none_or(|previous| {
        previous.manifests_hash != entry.manifests_hash
            || previous.deployment_config_hash != entry.deployment_config_hash
    });
    ctx.log().debug(format!(
        "Deploying {} ({})",
        name,
        if changed { "changed" } else { "unchanged, forced" }
    ));

    ctx.run_command(&kubectl_path, &kubectl_apply_args(deployment, kubectl, &sources))
        .map_err(|err| {
            if err.is_cancelled() {
                err
            } else {
                Error::deploy_failed(name, err.message)
            }
        })?;

    cache.deployments.insert(name.to_string(), entry);
    ctx.log().done(format!("Deployed {}", name));
    Ok(())
}

pub struct KubectlDeployer;

impl Deployer for KubectlDeployer {
    fn create_deployments(&self, ctx: &ExecutionContext, args: &[String]) -> Result<()> {
        let parsed = CREATE_DEPLOYMENTS_ARGS.parse(args)?;
        let render_only = parsed.switch("render");
        let config = ctx.config();
        let selected = select(&config.deployments, &parsed, Error::deployment_not_found)?;

        let mut cache = DeployCache::load(ctx.working_dir())?;
        for (name, deployment) in selected {
            ctx.check_cancelled()?;
            let result = deploy(ctx, name, deployment, &mut cache, render_only);
            if !render_only {
                cache.save(ctx.working_dir())?;
            }
            result?;
        }
        Ok(())
    }
}
