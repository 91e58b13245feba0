// src/repo/mod.rs

//! Repository configuration and package-group state
//!
//! Everything here runs through the baseline helper or edits `pacman.conf`;
//! none of it needs an AUR helper.

mod categories;

pub use categories::{
    CATEGORIES, GROUP_PREFIX, builtin_categories, merge_categories, parse_groups,
};

use crate::config::AioConfig;
use crate::error::Result;
use crate::exec::{CommandExecutor, CommandSpec, PhaseOutcome};
use crate::helpers::HelperRegistry;
use crate::ignore::IgnoreSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Section header the BlackArch strap script adds to pacman.conf
pub const REPO_SECTION: &str = "[blackarch]";

#[derive(Clone)]
pub struct RepoManager {
    config: Arc<AioConfig>,
    executor: Arc<dyn CommandExecutor>,
    helpers: Arc<HelperRegistry>,
}

impl RepoManager {
    pub fn new(
        config: Arc<AioConfig>,
        executor: Arc<dyn CommandExecutor>,
        helpers: Arc<HelperRegistry>,
    ) -> Self {
        Self {
            config,
            executor,
            helpers,
        }
    }

    pub fn repository_configured(&self) -> Result<bool> {
        let content = fs::read_to_string(&self.config.paths.pacman_conf)?;
        Ok(has_repo_section(&content))
    }

    /// Add the BlackArch repository with the strap script when missing
    pub async fn ensure_repository(&self) -> PhaseOutcome {
        info!("Checking BlackArch repository configuration...");
        match self.repository_configured() {
            Ok(true) => {
                debug!("{} already configured", REPO_SECTION);
                return PhaseOutcome::ok();
            }
            Ok(false) => info!("BlackArch repository not found. Configuring..."),
            Err(e) => {
                return PhaseOutcome::failed(format!(
                    "Cannot read {}: {}",
                    self.config.paths.pacman_conf.display(),
                    e
                ));
            }
        }

        let outcome = match tempfile::tempdir() {
            Ok(dir) => self.run_strap(dir.path()).await,
            Err(e) => PhaseOutcome::failed(e.to_string()),
        };
        if outcome.success {
            info!("BlackArch repository configured successfully");
        } else {
            warn!("Failed to configure BlackArch repo: {}", outcome.error_text());
        }
        outcome
    }

    async fn run_strap(&self, dir: &Path) -> PhaseOutcome {
        let script = dir.join("strap.sh").to_string_lossy().into_owned();

        let fetch = CommandSpec::new([
            "curl",
            "-fsSL",
            "-o",
            script.as_str(),
            self.config.update.strap_url.as_str(),
        ])
        .describe("Downloading strap.sh");
        let fetched = self.executor.outcome(&fetch).await;
        if !fetched.success {
            return fetched;
        }

        let strap = CommandSpec::new(["sh", script.as_str()])
            .privileged()
            .describe("Running strap.sh");
        self.executor.outcome(&strap).await
    }

    /// Install the keyring packages
    pub async fn update_keyrings(&self, ignore: &IgnoreSet) -> PhaseOutcome {
        info!("Updating keyrings...");
        self.install_each(&self.config.update.keyrings, ignore).await
    }

    /// Install the essential metapackages
    pub async fn ensure_metapackages(&self, ignore: &IgnoreSet) -> PhaseOutcome {
        info!("Ensuring essential metapackages...");
        self.install_each(&self.config.update.metapackages, ignore).await
    }

    async fn install_each(&self, packages: &[String], ignore: &IgnoreSet) -> PhaseOutcome {
        let baseline = self.helpers.baseline();
        let mut outcomes = Vec::with_capacity(packages.len());

        for package in packages {
            let Some(spec) = baseline.install_cmd(std::slice::from_ref(package), ignore) else {
                continue;
            };
            outcomes.push(self.executor.outcome(&spec).await);
        }
        PhaseOutcome::combine(outcomes)
    }

    /// Add packages to pacman.conf's `IgnorePkg`
    ///
    /// The merged file is staged in the temp dir and installed over
    /// pacman.conf with a privileged `install`. Succeeds without a write
    /// when the packages are already listed.
    pub async fn pin_ignored(&self, packages: &[String]) -> PhaseOutcome {
        let pacman_conf = &self.config.paths.pacman_conf;
        let content = match fs::read_to_string(pacman_conf) {
            Ok(content) => content,
            Err(e) => {
                return PhaseOutcome::failed(format!(
                    "Cannot read {}: {}",
                    pacman_conf.display(),
                    e
                ));
            }
        };

        let Some(updated) = merge_ignore_pkg(&content, packages) else {
            debug!("IgnorePkg already covers {:?}", packages);
            return PhaseOutcome::ok();
        };

        let outcome = match self.install_pacman_conf(&updated).await {
            Ok(outcome) => outcome,
            Err(e) => PhaseOutcome::failed(e.to_string()),
        };
        if outcome.success {
            info!("Added {:?} to IgnorePkg in {}", packages, pacman_conf.display());
        }
        outcome
    }

    async fn install_pacman_conf(&self, content: &str) -> Result<PhaseOutcome> {
        let mut staged = tempfile::NamedTempFile::new()?;
        staged.write_all(content.as_bytes())?;
        staged.flush()?;

        let pacman_conf = &self.config.paths.pacman_conf;
        let spec = CommandSpec::new([
            "install".to_string(),
            "-m".to_string(),
            "644".to_string(),
            staged.path().to_string_lossy().into_owned(),
            pacman_conf.to_string_lossy().into_owned(),
        ])
        .privileged()
        .describe(format!("Updating {}", pacman_conf.display()));

        Ok(self.executor.outcome(&spec).await)
    }

    /// Group names currently offered by the sync databases
    pub async fn official_categories(&self) -> Option<Vec<String>> {
        let spec = CommandSpec::new(["pacman", "-Sg"]).describe("Fetching categories");
        match self.executor.run(&spec).await {
            Ok(output) if output.success() => {
                let groups = parse_groups(&output.stdout);
                (!groups.is_empty()).then_some(groups)
            }
            Ok(output) => {
                debug!("pacman -Sg failed: {}", output.error_text());
                None
            }
            Err(e) => {
                debug!("pacman -Sg failed: {}", e);
                None
            }
        }
    }

    /// The run's category list: `known` plus any new official groups
    pub async fn sync_categories(&self, known: &[String]) -> Vec<String> {
        info!("Synchronizing BlackArch categories...");
        let Some(official) = self.official_categories().await else {
            warn!("Failed to fetch official categories. Using built-in list.");
            return known.to_vec();
        };

        let new: Vec<&String> = official.iter().filter(|c| !known.contains(c)).collect();
        if new.is_empty() {
            info!("Categories are already in sync");
            known.to_vec()
        } else {
            info!("New categories detected and added: {:?}", new);
            merge_categories(known, &official)
        }
    }
}

pub fn has_repo_section(pacman_conf: &str) -> bool {
    pacman_conf.lines().any(|line| line.trim() == REPO_SECTION)
}

/// Add packages to `IgnorePkg` under `[options]`
///
/// An existing active `IgnorePkg` line is extended in place; otherwise a new
/// line goes right after the `[options]` header. Comments and every other
/// line are preserved. Returns `None` when nothing would change.
pub fn merge_ignore_pkg(content: &str, packages: &[String]) -> Option<String> {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut in_options = false;
    let mut options_header = None;
    let mut existing = None;

    for (index, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_options = trimmed == "[options]";
            if in_options {
                options_header = Some(index);
            }
            continue;
        }
        if in_options
            && existing.is_none()
            && let Some((key, _)) = trimmed.split_once('=')
            && key.trim() == "IgnorePkg"
        {
            existing = Some(index);
        }
    }

    let current: Vec<String> = existing
        .and_then(|i| lines[i].split_once('='))
        .map(|(_, value)| value.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let mut merged = current.clone();
    for package in packages {
        if !merged.contains(package) {
            merged.push(package.clone());
        }
    }
    if merged.len() == current.len() {
        return None;
    }

    let entry = format!("IgnorePkg = {}", merged.join(" "));
    match (existing, options_header) {
        (Some(index), _) => lines[index] = entry,
        (None, Some(header)) => lines.insert(header + 1, entry),
        (None, None) => {
            lines.push("[options]".to_string());
            lines.push(entry);
        }
    }

    let mut updated = lines.join("\n");
    updated.push('\n');
    Some(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACMAN_CONF: &str = "\
# /etc/pacman.conf
[options]
HoldPkg     = pacman glibc
#IgnorePkg   =
Architecture = auto

[core]
Include = /etc/pacman.d/mirrorlist
";

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_repo_section_detection() {
        assert!(!has_repo_section(PACMAN_CONF));
        assert!(has_repo_section("[blackarch]\nServer = https://example.org\n"));
        assert!(!has_repo_section("#[blackarch]\n"));
    }

    #[test]
    fn test_ignore_pkg_inserted_after_options() {
        let updated = merge_ignore_pkg(PACMAN_CONF, &names(&["blackarch"])).unwrap();
        let lines: Vec<&str> = updated.lines().collect();
        assert_eq!(lines[1], "[options]");
        assert_eq!(lines[2], "IgnorePkg = blackarch");
        // The commented template stays untouched
        assert!(updated.contains("#IgnorePkg   ="));
        assert!(updated.contains("[core]\nInclude = /etc/pacman.d/mirrorlist\n"));
    }

    #[test]
    fn test_ignore_pkg_extended_in_place() {
        let content = "[options]\nIgnorePkg = linux\n[extra]\nIgnorePkg = nope\n";
        let updated = merge_ignore_pkg(content, &names(&["linux", "wcc"])).unwrap();
        assert_eq!(updated, "[options]\nIgnorePkg = linux wcc\n[extra]\nIgnorePkg = nope\n");

        assert!(merge_ignore_pkg(&updated, &names(&["wcc"])).is_none());
    }

    #[test]
    fn test_ignore_pkg_without_options_section() {
        let updated = merge_ignore_pkg("[core]\n", &names(&["wcc"])).unwrap();
        assert_eq!(updated, "[core]\n[options]\nIgnorePkg = wcc\n");
    }
}
