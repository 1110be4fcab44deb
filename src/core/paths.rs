use crate::error::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Project config file name, looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = "stevedore.yaml";

/// Base stevedore config directory (~/.config/stevedore/ on all platforms)
pub fn stevedore() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("stevedore"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("stevedore"))
    }
}

/// Global stevedore.json config file path
pub fn stevedore_json() -> Result<PathBuf> {
    Ok(stevedore()?.join("stevedore.json"))
}

/// Downloaded tool binaries
pub fn bin() -> Result<PathBuf> {
    Ok(stevedore()?.join("bin"))
}

/// File logger output
pub fn logs() -> Result<PathBuf> {
    Ok(stevedore()?.join("logs"))
}

pub fn log_file(name: &str) -> Result<PathBuf> {
    Ok(logs()?.join(format!("{}.log", name)))
}

/// Project config file for a directory, honouring STEVEDORE_CONFIG.
pub fn project_config(dir: &Path) -> PathBuf {
    match env::var("STEVEDORE_CONFIG") {
        Ok(path) if !path.is_empty() => {
            let path = PathBuf::from(path);
            if path.is_absolute() {
                path
            } else {
                dir.join(path)
            }
        }
        _ => dir.join(PROJECT_CONFIG_FILE),
    }
}

/// Project-local state directory (.stevedore/ next to the config)
pub fn project_state(dir: &Path) -> PathBuf {
    dir.join(".stevedore")
}

pub fn deploy_cache(dir: &Path) -> PathBuf {
    project_state(dir).join("deploy-cache.json")
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve_in(base: &Path, path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    let candidate = Path::new(expanded.as_ref());
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}
