// src/kernel/mod.rs

//! Kernel-family upgrade detection and post-upgrade tasks
//!
//! - Pending kernel packages are found in `pacman -Qu` output by exact name
//!   or by a flavour prefix (`linux-zen-headers` is a kernel package,
//!   `linux-firmware` is not)
//! - Out-of-tree modules are rebuilt with `dkms autoinstall`
//! - Boot images are regenerated with dracut, once per installed kernel

mod upgrade;

pub use upgrade::KernelUpgradeOrchestrator;

use crate::exec::{CommandExecutor, CommandSpec, PhaseOutcome};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Kernel packages matched by exact name
pub const KERNEL_PACKAGES: &[&str] = &["linux", "linux-zen", "linux-lts", "linux-hardened"];

/// Kernel flavours whose every package counts, headers included
pub const KERNEL_PREFIXES: &[&str] = &["linux-zen", "linux-lts", "linux-hardened"];

/// A pending upgrade of a kernel-family package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelUpdateCandidate {
    /// The full listing line, e.g. `linux 6.9.1-1 -> 6.9.2-1`
    pub package_line: String,
    pub package_name: String,
}

pub fn is_kernel_package(name: &str) -> bool {
    KERNEL_PACKAGES.contains(&name) || KERNEL_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Kernel-family entries of a pending-upgrade listing
pub fn detect_candidates<'a>(
    lines: impl IntoIterator<Item = &'a str>,
) -> Vec<KernelUpdateCandidate> {
    lines
        .into_iter()
        .map(str::trim)
        .filter_map(|line| {
            let name = line.split_whitespace().next()?;
            is_kernel_package(name).then(|| KernelUpdateCandidate {
                package_line: line.to_string(),
                package_name: name.to_string(),
            })
        })
        .collect()
}

/// Per-kernel result of boot image regeneration
#[derive(Debug, Clone, Default, Serialize)]
pub struct InitramfsReport {
    pub regenerated: Vec<String>,
    pub failed: Vec<String>,
    /// Why nothing was attempted
    pub skipped: Option<String>,
}

impl InitramfsReport {
    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn outcome(&self) -> PhaseOutcome {
        if let Some(reason) = &self.skipped {
            return PhaseOutcome::failed(reason.clone());
        }
        if self.failed.is_empty() {
            PhaseOutcome::ok()
        } else {
            PhaseOutcome::failed(format!(
                "initramfs regeneration failed for {}",
                self.failed.join(", ")
            ))
        }
    }
}

/// The running kernel release
pub fn running_kernel() -> String {
    nix::sys::utsname::uname()
        .map(|uts| uts.release().to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Kernel tooling shared by the update pipeline and the kernel flow
#[derive(Clone)]
pub struct KernelTools {
    executor: Arc<dyn CommandExecutor>,
    modules_dir: PathBuf,
}

impl KernelTools {
    pub fn new(executor: Arc<dyn CommandExecutor>, modules_dir: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            modules_dir: modules_dir.into(),
        }
    }

    /// Kernel packages among pending upgrades
    ///
    /// `pacman -Qu` exits non-zero when nothing is pending; that is an empty
    /// list, not an error.
    pub async fn pending_kernel_updates(&self) -> Vec<KernelUpdateCandidate> {
        let spec = CommandSpec::new(["pacman", "-Qu"]).describe("Listing pending upgrades");
        match self.executor.run(&spec).await {
            Ok(output) if output.success() => detect_candidates(output.stdout.lines()),
            Ok(_) => Vec::new(),
            Err(e) => {
                error!("Failed to check pending kernel updates: {}", e);
                Vec::new()
            }
        }
    }

    /// Registered DKMS modules, one `dkms status` line each
    pub async fn dkms_modules(&self) -> Vec<String> {
        if !self.executor.tool_available("dkms") {
            debug!("DKMS is not installed on this system");
            return Vec::new();
        }

        let spec = CommandSpec::new(["dkms", "status"]).describe("Listing DKMS modules");
        match self.executor.run(&spec).await {
            Ok(output) if output.success() => output
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Ok(_) => {
                info!("DKMS not installed or no modules registered");
                Vec::new()
            }
            Err(e) => {
                error!("Failed to query DKMS status: {}", e);
                Vec::new()
            }
        }
    }

    /// Rebuild every DKMS module; a missing dkms is a clean skip
    pub async fn rebuild_dkms(&self) -> PhaseOutcome {
        if !self.executor.tool_available("dkms") {
            info!("DKMS not installed, skipping module rebuild");
            return PhaseOutcome::ok();
        }

        info!("Rebuilding all DKMS modules...");
        let spec = CommandSpec::new(["dkms", "autoinstall"])
            .privileged()
            .describe("Rebuilding DKMS modules");
        let rebuilt = self.executor.outcome(&spec).await;
        if rebuilt.success {
            info!("DKMS autoinstall completed successfully");
        } else {
            error!("DKMS autoinstall failed: {}", rebuilt.error_text());
        }
        rebuilt
    }

    /// Kernel versions under the modules dir that ship a `vmlinuz`
    pub fn installed_kernels(&self) -> Vec<String> {
        installed_kernels(&self.modules_dir)
    }

    /// Regenerate the initramfs of each installed kernel independently
    pub async fn regenerate_initramfs(&self) -> InitramfsReport {
        if !self.executor.tool_available("dracut") {
            warn!("dracut not found, skipping initramfs regeneration");
            return InitramfsReport::skipped("dracut not installed");
        }

        let kernels = self.installed_kernels();
        if kernels.is_empty() {
            warn!("No kernel module directories found in {}", self.modules_dir.display());
            return InitramfsReport::skipped("no installed kernels found");
        }

        let mut report = InitramfsReport::default();
        for kver in kernels {
            info!("Regenerating initramfs for kernel {}...", kver);
            let spec = CommandSpec::new(["dracut", "--force", "--kver", kver.as_str()])
                .privileged()
                .describe(format!("dracut for {}", kver));

            let built = self.executor.outcome(&spec).await;
            if built.success {
                info!("initramfs regenerated for {}", kver);
                report.regenerated.push(kver);
            } else {
                error!("Failed to regenerate initramfs for {}: {}", kver, built.error_text());
                report.failed.push(kver);
            }
        }
        report
    }
}

fn installed_kernels(modules_dir: &Path) -> Vec<String> {
    let pattern = modules_dir.join("*").join("vmlinuz");
    let Ok(entries) = glob::glob(&pattern.to_string_lossy()) else {
        return Vec::new();
    };

    let mut kernels: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|vmlinuz| {
            vmlinuz
                .parent()?
                .file_name()?
                .to_str()
                .map(str::to_string)
        })
        .collect();
    kernels.sort();
    kernels
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_detect_single_kernel() {
        let candidates = detect_candidates(["linux 6.9.1-1", "htop 3.3.0-1"]);
        assert_eq!(
            candidates,
            vec![KernelUpdateCandidate {
                package_line: "linux 6.9.1-1".to_string(),
                package_name: "linux".to_string(),
            }]
        );
    }

    #[test]
    fn test_kernel_family_matching() {
        assert!(is_kernel_package("linux"));
        assert!(is_kernel_package("linux-lts"));
        assert!(is_kernel_package("linux-zen-headers"));
        assert!(is_kernel_package("linux-hardened-docs"));
        assert!(!is_kernel_package("linux-firmware"));
        assert!(!is_kernel_package("linux-headers"));
        assert!(!is_kernel_package("util-linux"));
    }

    #[test]
    fn test_detect_ignores_blank_lines() {
        let listing = "\nlinux-lts 6.6.30-1 -> 6.6.31-1\n  \nlinux-lts-headers 6.6.30-1 -> 6.6.31-1\n";
        let names: Vec<String> = detect_candidates(listing.lines())
            .into_iter()
            .map(|c| c.package_name)
            .collect();
        assert_eq!(names, vec!["linux-lts", "linux-lts-headers"]);
    }

    #[test]
    fn test_installed_kernels_need_vmlinuz() {
        let temp_dir = tempfile::tempdir().unwrap();
        let modules = temp_dir.path();
        for kver in ["6.9.2-arch1-1", "6.6.31-1-lts"] {
            fs::create_dir_all(modules.join(kver)).unwrap();
            fs::write(modules.join(kver).join("vmlinuz"), b"").unwrap();
        }
        // Leftover modules of a removed kernel
        fs::create_dir_all(modules.join("6.8.0-arch1-1")).unwrap();

        assert_eq!(
            installed_kernels(modules),
            vec!["6.6.31-1-lts", "6.9.2-arch1-1"]
        );
    }
}
