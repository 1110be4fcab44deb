//! Project configuration (`stevedore.yaml`).
//!
//! ```yaml
//! name: shop
//! images:
//!   api: { image: registry.local/shop/api, dockerfile: api/Dockerfile, context: api }
//! deployments:
//!   api: { namespace: shop, kubectl: { manifests: [k8s/*.yaml] } }
//! dev:
//!   api: { command: "cargo watch -x run", workdir: api }
//! pipelines:
//!   deploy: { run: "build_images --all\ncreate_deployments --all" }
//! dependencies:
//!   auth: { path: ../auth, pipeline: deploy }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::paths;
use crate::utils::io;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub images: BTreeMap<String, ImageConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deployments: BTreeMap<String, DeploymentConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dev: BTreeMap<String, DevConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pipelines: BTreeMap<String, PipelineConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, DependencyConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub build_args: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubectl: Option<KubectlConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KubectlConfig {
    #[serde(default)]
    pub manifests: Vec<String>,
    /// Treat each manifest entry as a kustomization directory
    #[serde(default)]
    pub kustomize: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apply_args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DevConfig {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub run: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyConfig {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl ProjectConfig {
    pub fn image(&self, name: &str) -> Result<&ImageConfig> {
        self.images
            .get(name)
            .ok_or_else(|| Error::image_not_found(name))
    }

    pub fn deployment(&self, name: &str) -> Result<&DeploymentConfig> {
        self.deployments
            .get(name)
            .ok_or_else(|| Error::deployment_not_found(name))
    }

    pub fn dev_config(&self, name: &str) -> Result<&DevConfig> {
        self.dev.get(name).ok_or_else(|| Error::dev_not_found(name))
    }

    pub fn pipeline(&self, name: &str) -> Result<&PipelineConfig> {
        self.pipelines
            .get(name)
            .ok_or_else(|| Error::pipeline_not_found(name))
    }

    pub fn dependency(&self, name: &str) -> Result<&DependencyConfig> {
        self.dependencies
            .get(name)
            .ok_or_else(|| Error::dependency_not_found(name))
    }

    pub fn validate(&self) -> Result<()> {
        for (name, image) in &self.images {
            if image.image.trim().is_empty() {
                return Err(Error::config_invalid_value(
                    format!("images.{}.image", name),
                    None,
                    format!("image '{}' has no image name", name),
                ));
            }
        }
        for (name, dev) in &self.dev {
            if dev.command.trim().is_empty() {
                return Err(Error::config_invalid_value(
                    format!("dev.{}.command", name),
                    None,
                    format!("dev configuration '{}' has no command", name),
                ));
            }
        }
        for (name, dependency) in &self.dependencies {
            for needed in &dependency.depends_on {
                if !self.dependencies.contains_key(needed) {
                    return Err(Error::config_invalid_value(
                        format!("dependencies.{}.depends_on", name),
                        Some(needed.clone()),
                        format!("dependency '{}' depends on unknown dependency '{}'", name, needed),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Parse a project config from YAML text.
pub fn parse(content: &str, origin: &str) -> Result<ProjectConfig> {
    let config: ProjectConfig =
        serde_yml::from_str(content).map_err(|e| Error::config_invalid_yaml(origin, e))?;
    config.validate()?;
    Ok(config)
}

/// Load the project config for `dir`.
pub fn load(dir: &Path) -> Result<ProjectConfig> {
    let path = paths::project_config(dir);
    load_file(&path)
}

pub fn load_file(path: &Path) -> Result<ProjectConfig> {
    if !path.exists() {
        return Err(Error::config_missing_key(
            paths::PROJECT_CONFIG_FILE,
            Some(path.display().to_string()),
        )
        .with_hint("Create a stevedore.yaml in the project directory"));
    }

    let content = io::read_file(path, &format!("read {}", path.display()))?;
    let mut config = parse(&content, &path.display().to_string())?;

    if config.name.is_empty() {
        config.name = default_project_name(path);
    }
    Ok(config)
}

fn default_project_name(config_path: &Path) -> String {
    config_path
        .parent()
        .and_then(|dir| dir.file_name())
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| PathBuf::from(".").display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name: shop
images:
  api:
    image: registry.local/shop/api
    dockerfile: api/Dockerfile
deployments:
  api:
    namespace: shop
    kubectl:
      manifests: ["k8s/*.yaml"]
dev:
  api:
    command: cargo run
pipelines:
  deploy:
    run: |
      build_images --all
      create_deployments --all
dependencies:
  auth:
    path: ../auth
  billing:
    path: ../billing
    depends_on: [auth]
"#;

    #[test]
    fn parses_sample_config() {
        let config = parse(SAMPLE, "stevedore.yaml").unwrap();
        assert_eq!(config.name, "shop");
        assert_eq!(config.image("api").unwrap().image, "registry.local/shop/api");
        let kubectl = config.deployment("api").unwrap().kubectl.as_ref().unwrap();
        assert_eq!(kubectl.manifests, vec!["k8s/*.yaml"]);
        assert!(config.pipeline("deploy").unwrap().run.contains("create_deployments"));
        assert_eq!(config.dependency("billing").unwrap().depends_on, vec!["auth"]);
    }

    #[test]
    fn unknown_names_are_not_found_errors() {
        let config = parse(SAMPLE, "stevedore.yaml").unwrap();
        assert_eq!(
            config.pipeline("nope").unwrap_err().code,
            crate::ErrorCode::PipelineNotFound
        );
        assert_eq!(
            config.image("nope").unwrap_err().code,
            crate::ErrorCode::ImageNotFound
        );
    }

    #[test]
    fn rejects_unknown_dependency_edges() {
        let err = parse(
            "dependencies:\n  a:\n    path: ../a\n    depends_on: [ghost]\n",
            "stevedore.yaml",
        )
        .unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ConfigInvalidValue);
    }

    #[test]
    fn invalid_yaml_reports_origin() {
        let err = parse("images: [unclosed", "app/stevedore.yaml").unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ConfigInvalidYaml);
        assert_eq!(err.details["path"], "app/stevedore.yaml");
    }

    #[test]
    fn load_defaults_name_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("inventory");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("stevedore.yaml"), "pipelines: {}\n").unwrap();

        let config = load_file(&project.join("stevedore.yaml")).unwrap();
        assert_eq!(config.name, "inventory");
    }
}
