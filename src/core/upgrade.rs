//! Version check against the latest GitHub release.
//!
//! The latest version is fetched at most once per process; every later
//! call reuses the first answer, failures included.
//!
//! Disable via:
//! - Environment variable: `STEVEDORE_SKIP_VERSION_CHECK=true`
//! - Config: `"update_check": false` in stevedore.json

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::log::Logger;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const GITHUB_RELEASES_API: &str =
    "https://api.github.com/repos/stevedore-dev/stevedore/releases/latest";
const ENV_VAR_SKIP: &str = "STEVEDORE_SKIP_VERSION_CHECK";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionCheck {
    pub command: String,
    pub current_version: String,
    pub latest_version: Option<String>,
    pub update_available: bool,
}

#[derive(Deserialize)]
struct GitHubRelease {
    tag_name: String,
}

pub fn current_version() -> &'static str {
    VERSION
}

fn fetch_latest_github_version() -> Result<String> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(format!("stevedore/{}", VERSION))
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(|e| Error::internal_io(e.to_string(), Some("create HTTP client".to_string())))?;

    let response: GitHubRelease = client
        .get(GITHUB_RELEASES_API)
        .send()
        .map_err(|e| Error::internal_io(e.to_string(), Some("query GitHub releases".to_string())))?
        .json()
        .map_err(|e| {
            Error::internal_json(e.to_string(), Some("parse GitHub release response".to_string()))
        })?;

    normalize_version(&response.tag_name).ok_or_else(|| {
        Error::internal_unexpected(format!("unrecognized release tag '{}'", response.tag_name))
    })
}

/// Extract `MAJOR.MINOR.PATCH[-pre]` from a tag such as `v1.2.3`.
pub fn normalize_version(tag: &str) -> Option<String> {
    static TAG: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = TAG
        .get_or_init(|| Regex::new(r"^v?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?)").ok())
        .as_ref()?;

    let captures = pattern.captures(tag.trim())?;
    semver::Version::parse(&captures[1]).ok().map(|v| v.to_string())
}

pub fn version_is_newer(latest: &str, current: &str) -> bool {
    match (
        semver::Version::parse(latest.trim_start_matches('v')),
        semver::Version::parse(current.trim_start_matches('v')),
    ) {
        (Ok(l), Ok(c)) => l > c,
        _ => false,
    }
}

/// A lazily fetched latest version, computed once.
pub struct LatestVersion {
    cell: OnceLock<std::result::Result<String, Error>>,
}

impl LatestVersion {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    pub fn get_or_fetch<F>(&self, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Result<String>,
    {
        self.cell.get_or_init(fetch).clone()
    }
}

impl Default for LatestVersion {
    fn default() -> Self {
        Self::new()
    }
}

static LATEST: LatestVersion = LatestVersion::new();

/// Latest released version, fetched on first use.
pub fn check_for_newer_version() -> Result<String> {
    LATEST.get_or_fetch(fetch_latest_github_version)
}

/// The latest version if it is newer than this binary.
pub fn newer_version_available() -> Option<String> {
    check_for_newer_version()
        .ok()
        .filter(|latest| version_is_newer(latest, current_version()))
}

pub fn check_for_updates() -> Result<VersionCheck> {
    let current = current_version().to_string();
    let latest = check_for_newer_version().ok();
    let update_available = latest
        .as_deref()
        .is_some_and(|l| version_is_newer(l, &current));

    Ok(VersionCheck {
        command: "upgrade.check".to_string(),
        current_version: current,
        latest_version: latest,
        update_available,
    })
}

fn is_disabled_by_env() -> bool {
    std::env::var(ENV_VAR_SKIP)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn is_disabled() -> bool {
    is_disabled_by_env() || !crate::defaults::load_config().update_check
}

/// Warn through `log` when a newer release exists.
pub fn print_upgrade_message(log: &Logger) {
    if is_disabled() {
        return;
    }
    if let Some(latest) = newer_version_available() {
        log.warn(format!(
            "stevedore {} is available (current: {}). Download it from https://github.com/stevedore-dev/stevedore/releases",
            latest,
            current_version()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_version_comparison() {
        assert!(version_is_newer("0.12.0", "0.11.0"));
        assert!(version_is_newer("1.0.0", "0.99.99"));
        assert!(version_is_newer("v0.11.1", "0.11.0"));
        assert!(!version_is_newer("0.11.0", "0.11.0"));
        assert!(!version_is_newer("0.10.0", "0.11.0"));
        assert!(!version_is_newer("1.0.0-beta.1", "1.0.0"));
        assert!(!version_is_newer("garbage", "0.1.0"));
    }

    #[test]
    fn test_normalize_version() {
        assert_eq!(normalize_version("v1.2.3").as_deref(), Some("1.2.3"));
        assert_eq!(normalize_version("1.2.3-rc.1").as_deref(), Some("1.2.3-rc.1"));
        assert_eq!(normalize_version("v2.0.0+build.5").as_deref(), Some("2.0.0"));
        assert_eq!(normalize_version("latest"), None);
    }

    #[test]
    fn test_latest_version_fetched_once() {
        let calls = AtomicUsize::new(0);
        let latest = LatestVersion::new();

        for _ in 0..3 {
            let version = latest
                .get_or_fetch(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("9.9.9".to_string())
                })
                .unwrap();
            assert_eq!(version, "9.9.9");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_fetch_is_also_memoized() {
        let latest = LatestVersion::new();
        assert!(latest
            .get_or_fetch(|| Err(Error::internal_unexpected("offline")))
            .is_err());
        assert!(latest.get_or_fetch(|| Ok("1.0.0".to_string())).is_err());
    }

    #[test]
    fn test_current_version() {
        let version = current_version();
        assert!(!version.is_empty());
        assert!(semver::Version::parse(version).is_ok());
    }
}
