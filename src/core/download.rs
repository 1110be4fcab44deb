//! Acquisition of external tool binaries (kubectl, helm).
//!
//! Resolution order for a tool:
//! 1. Already on PATH
//! 2. Previously downloaded into `~/.config/stevedore/bin/`
//! 3. Downloaded from the URL configured in stevedore.json
//!
//! `Downloader` memoizes resolved paths so a run pays the lookup or
//! download cost once per tool.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::defaults::{ToolConfig, ToolsConfig};
use crate::error::{Error, Result};
use crate::log::Logger;
use crate::paths;
use crate::utils::command;
use crate::utils::template::{render, TemplateVars};

const DOWNLOAD_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolCommand {
    Kubectl,
    Helm,
}

impl ToolCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCommand::Kubectl => "kubectl",
            ToolCommand::Helm => "helm",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "kubectl" => Some(ToolCommand::Kubectl),
            "helm" => Some(ToolCommand::Helm),
            _ => None,
        }
    }

    pub fn binary_name(&self) -> String {
        if cfg!(windows) {
            format!("{}.exe", self.name())
        } else {
            self.name().to_string()
        }
    }
}

/// Produces a local path for a tool, installing it if needed.
pub trait ToolInstaller: Send + Sync {
    fn install(&self, tool: ToolCommand) -> Result<PathBuf>;
}

/// Caching front for a `ToolInstaller`.
pub struct Downloader {
    installer: Box<dyn ToolInstaller>,
    resolved: Mutex<HashMap<ToolCommand, PathBuf>>,
    log: Logger,
}

impl Downloader {
    pub fn new(installer: Box<dyn ToolInstaller>, log: Logger) -> Self {
        Self {
            installer,
            resolved: Mutex::new(HashMap::new()),
            log,
        }
    }

    /// Downloader backed by PATH lookup, the bin cache and HTTP downloads.
    pub fn http(tools: ToolsConfig) -> Self {
        Self::new(Box::new(HttpInstaller::new(tools)), Logger::file("downloader"))
    }

    pub fn ensure_command(&self, tool: ToolCommand) -> Result<PathBuf> {
        let mut resolved = self.resolved.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(path) = resolved.get(&tool) {
            return Ok(path.clone());
        }

        // Held across the install so concurrent steps asking for the same
        // tool wait for one download instead of racing.
        let path = self.installer.install(tool)?;
        self.log
            .debug(format!("resolved {} to {}", tool.name(), path.display()));
        resolved.insert(tool, path.clone());
        Ok(path)
    }
}

pub struct HttpInstaller {
    tools: ToolsConfig,
    bin_dir: Option<PathBuf>,
}

impl HttpInstaller {
    pub fn new(tools: ToolsConfig) -> Self {
        Self {
            tools,
            bin_dir: None,
        }
    }

    pub fn with_bin_dir(mut self, dir: PathBuf) -> Self {
        self.bin_dir = Some(dir);
        self
    }

    fn bin_dir(&self) -> Result<PathBuf> {
        match &self.bin_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::bin(),
        }
    }

    fn config(&self, tool: ToolCommand) -> &ToolConfig {
        match tool {
            ToolCommand::Kubectl => &self.tools.kubectl,
            ToolCommand::Helm => &self.tools.helm,
        }
    }

    fn download(&self, tool: ToolCommand, target: &Path) -> Result<()> {
        let config = self.config(tool);
        let url = download_url(&config.url_template, &config.version);

        log_status!("download", "Downloading {} {}", tool.name(), config.version);

        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("stevedore/{}", crate::upgrade::current_version()))
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::download_failed(tool.name(), e.to_string()))?;

        let response = client
            .get(&url)
            .send()
            .map_err(|e| Error::download_failed(tool.name(), e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::download_failed(
                tool.name(),
                format!("GET {} returned {}", url, response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .map_err(|e| Error::download_failed(tool.name(), e.to_string()))?;

        let dir = target
            .parent()
            .ok_or_else(|| Error::internal_unexpected("tool path has no parent"))?;
        fs::create_dir_all(dir).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("create {}", dir.display())))
        })?;

        match &config.archive_member {
            Some(member) => {
                let member = render(member, &platform_vars(&config.version));
                extract_archive_member(tool, &bytes, &member, target)?
            }
            None => fs::write(target, &bytes).map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("write {}", target.display())))
            })?,
        }

        make_executable(target)
    }
}

impl ToolInstaller for HttpInstaller {
    fn install(&self, tool: ToolCommand) -> Result<PathBuf> {
        if let Ok(path) = which::which(tool.name()) {
            return Ok(path);
        }

        let target = self.bin_dir()?.join(tool.binary_name());
        if target.is_file() {
            return Ok(target);
        }

        self.download(tool, &target)?;
        Ok(target)
    }
}

fn platform_vars(version: &str) -> Vec<(&'static str, String)> {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    };
    vec![
        (TemplateVars::VERSION, version.to_string()),
        (TemplateVars::OS, os.to_string()),
        (TemplateVars::ARCH, arch.to_string()),
    ]
}

pub fn download_url(template: &str, version: &str) -> String {
    render(template, &platform_vars(version))
}

fn extract_archive_member(
    tool: ToolCommand,
    archive: &[u8],
    member: &str,
    target: &Path,
) -> Result<()> {
    let dir = target
        .parent()
        .ok_or_else(|| Error::internal_unexpected("tool path has no parent"))?;
    let staging = dir.join(format!(".{}-extract", tool.name()));
    let archive_path = dir.join(format!(".{}.tar.gz", tool.name()));

    fs::create_dir_all(&staging).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("create {}", staging.display())))
    })?;
    fs::write(&archive_path, archive).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("write {}", archive_path.display())))
    })?;

    let archive_arg = archive_path.to_string_lossy().to_string();
    let staging_arg = staging.to_string_lossy().to_string();
    let extracted = command::run(
        "tar",
        &["-xzf", &archive_arg, "-C", &staging_arg, member],
        "extract tool archive",
    )
    .and_then(|_| {
        fs::rename(staging.join(member), target).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("move {}", target.display())))
        })
    });

    let _ = fs::remove_file(&archive_path);
    let _ = fs::remove_dir_all(&staging);

    extracted.map_err(|e| Error::download_failed(tool.name(), e.message))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("chmod {}", path.display())))
    })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
