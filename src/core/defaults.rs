use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::log::LogLevel;
use crate::paths;

/// Root configuration structure for stevedore.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StevedoreConfig {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default = "default_true")]
    pub update_check: bool,
}

impl Default for StevedoreConfig {
    fn default() -> Self {
        Self {
            defaults: Defaults::default(),
            log_level: LogLevel::default(),
            update_check: true,
        }
    }
}

/// All configurable defaults that can be overridden via stevedore.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_tools")]
    pub tools: ToolsConfig,

    #[serde(default = "default_exec")]
    pub exec: ExecConfig,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            tools: default_tools(),
            exec: default_exec(),
        }
    }
}

/// Download locations for tools the fallback provider can acquire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_kubectl")]
    pub kubectl: ToolConfig,

    #[serde(default = "default_helm")]
    pub helm: ToolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub version: String,
    /// Supports {{version}}, {{os}} and {{arch}} placeholders
    pub url_template: String,
    /// Path of the binary inside a downloaded archive; None for plain binaries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_member: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Grace period between SIGTERM and SIGKILL for external commands
    #[serde(default = "default_kill_grace_secs")]
    pub kill_grace_secs: u64,
}

impl ExecConfig {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_tools() -> ToolsConfig {
    ToolsConfig {
        kubectl: default_kubectl(),
        helm: default_helm(),
    }
}

fn default_kubectl() -> ToolConfig {
    ToolConfig {
        version: "v1.30.2".to_string(),
        url_template: "https://dl.k8s.io/release/{{version}}/bin/{{os}}/{{arch}}/kubectl"
            .to_string(),
        archive_member: None,
    }
}

fn default_helm() -> ToolConfig {
    ToolConfig {
        version: "v3.15.2".to_string(),
        url_template: "https://get.helm.sh/helm-{{version}}-{{os}}-{{arch}}.tar.gz".to_string(),
        archive_member: Some("{{os}}-{{arch}}/helm".to_string()),
    }
}

fn default_exec() -> ExecConfig {
    ExecConfig {
        kill_grace_secs: default_kill_grace_secs(),
    }
}

fn default_kill_grace_secs() -> u64 {
    2
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load defaults, merging file config with built-in defaults.
/// If stevedore.json is missing or invalid, silently returns built-in defaults.
pub fn load_defaults() -> Defaults {
    load_config().defaults
}

/// Load the full stevedore.json config, falling back to defaults on any error.
pub fn load_config() -> StevedoreConfig {
    load_config_from_file().unwrap_or_default()
}

fn load_config_from_file() -> crate::Result<StevedoreConfig> {
    let path = paths::stevedore_json()?;

    if !path.exists() {
        return Err(crate::Error::config_missing_key(
            "stevedore.json",
            Some(path.display().to_string()),
        ));
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        crate::Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    parse_config(&content)
}

fn parse_config(content: &str) -> crate::Result<StevedoreConfig> {
    serde_json::from_str(content).map_err(|e| {
        crate::Error::internal_json(e.to_string(), Some("parse stevedore.json".to_string()))
    })
}
