// src/system_fixes.rs

//! Preventive system fixes applied before upgrades
//!
//! Every fix is idempotent: it inspects the current state first and does
//! nothing when the system already looks right. Failures are logged and
//! reported, never fatal.

use crate::config::PathsConfig;
use crate::error::Result;
use crate::exec::{CommandExecutor, CommandSpec};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const LIBJODYCODE: &str = "libjodycode.so";
/// Soversion some BlackArch tools were linked against
const LIBJODYCODE_COMPAT: u32 = 3;

pub const DRACUT_CONF: &str =
    "# Fix dracut to use /boot instead of EFI partition\nuefi=\"no\"\nhostonly=\"yes\"\ncompress=\"zstd\"\n";

pub const KERNEL_INSTALL_CONF: &str = "layout=bls\ninitrd_generator=dracut\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    Applied,
    AlreadyApplied,
    NotApplicable,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemFixReport {
    pub libjodycode: FixStatus,
    pub dracut_conf: FixStatus,
    pub kernel_install_conf: FixStatus,
}

impl SystemFixReport {
    pub fn all_ok(&self) -> bool {
        [self.libjodycode, self.dracut_conf, self.kernel_install_conf]
            .iter()
            .all(|s| *s != FixStatus::Failed)
    }
}

#[derive(Clone)]
pub struct SystemFixes {
    executor: Arc<dyn CommandExecutor>,
    paths: PathsConfig,
}

impl SystemFixes {
    pub fn new(executor: Arc<dyn CommandExecutor>, paths: PathsConfig) -> Self {
        Self { executor, paths }
    }

    pub async fn apply(&self) -> SystemFixReport {
        info!("Applying preventive system fixes");
        let report = SystemFixReport {
            libjodycode: self.fix_libjodycode().await,
            dracut_conf: self
                .ensure_config_file(&self.paths.dracut_conf, DRACUT_CONF)
                .await,
            kernel_install_conf: self
                .ensure_config_file(&self.paths.kernel_install_conf, KERNEL_INSTALL_CONF)
                .await,
        };
        debug!("System fixes: {:?}", report);
        report
    }

    /// Point `libjodycode.so.3` at the newest installed soversion
    async fn fix_libjodycode(&self) -> FixStatus {
        let link = self
            .paths
            .lib_dir
            .join(format!("{}.{}", LIBJODYCODE, LIBJODYCODE_COMPAT));

        let Some(target) = newest_libjodycode(&self.paths.lib_dir) else {
            debug!("libjodycode not installed, skipping symlink");
            return FixStatus::NotApplicable;
        };

        if let (Ok(current), Ok(expected)) = (fs::canonicalize(&link), fs::canonicalize(&target)) {
            if current == expected {
                debug!("{} already points at {}", link.display(), target.display());
                return FixStatus::AlreadyApplied;
            }
            info!("Updating {} -> {}", link.display(), target.display());
        }

        let spec = CommandSpec::new([
            "ln".to_string(),
            "-sf".to_string(),
            target.to_string_lossy().into_owned(),
            link.to_string_lossy().into_owned(),
        ])
        .privileged()
        .describe("Linking libjodycode compatibility soname");

        let linked = self.executor.outcome(&spec).await;
        if linked.success {
            info!("{} -> {} symlink created", link.display(), target.display());
            FixStatus::Applied
        } else {
            warn!("Failed to create libjodycode symlink: {}", linked.error_text());
            FixStatus::Failed
        }
    }

    /// Write a root-owned config file unless one already exists
    async fn ensure_config_file(&self, path: &Path, content: &str) -> FixStatus {
        if path.exists() {
            debug!("{} already exists, skipping", path.display());
            return FixStatus::AlreadyApplied;
        }

        match self.install_config_file(path, content).await {
            Ok(true) => {
                info!("Created {}", path.display());
                FixStatus::Applied
            }
            Ok(false) => FixStatus::Failed,
            Err(e) => {
                warn!("Failed to create {}: {}", path.display(), e);
                FixStatus::Failed
            }
        }
    }

    async fn install_config_file(&self, path: &Path, content: &str) -> Result<bool> {
        let mut staged = tempfile::NamedTempFile::new()?;
        staged.write_all(content.as_bytes())?;
        staged.flush()?;

        let spec = CommandSpec::new([
            "install".to_string(),
            "-D".to_string(),
            "-m".to_string(),
            "644".to_string(),
            staged.path().to_string_lossy().into_owned(),
            path.to_string_lossy().into_owned(),
        ])
        .privileged()
        .describe(format!("Installing {}", path.display()));

        let installed = self.executor.outcome(&spec).await;
        if !installed.success {
            warn!("Could not install {}: {}", path.display(), installed.error_text());
        }
        Ok(installed.success)
    }
}

/// `libjodycode.so.<N>` with the highest plain numeric N other than the compat one
fn newest_libjodycode(lib_dir: &Path) -> Option<PathBuf> {
    let pattern = lib_dir.join(format!("{}.[0-9]*", LIBJODYCODE));
    let entries = glob::glob(&pattern.to_string_lossy()).ok()?;

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let version: u32 = name.strip_prefix(LIBJODYCODE)?.strip_prefix('.')?.parse().ok()?;
            (version != LIBJODYCODE_COMPAT).then_some((version, path))
        })
        .max_by_key(|(version, _)| *version)
        .map(|(_, path)| path)
}
