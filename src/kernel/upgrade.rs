// src/kernel/upgrade.rs

//! Standalone kernel upgrade flow

use super::{KernelTools, KernelUpdateCandidate, running_kernel};
use crate::exec::{CommandExecutor, PhaseOutcome};
use crate::helpers::HelperRegistry;
use crate::ignore::IgnoreSet;
use crate::report::FlowOutcome;
use crate::snapshot::{SnapshotGuard, SnapshotOutcome};
use crate::system_fixes::SystemFixes;
use std::sync::Arc;
use tracing::{error, info};

/// Upgrades pending kernel packages between checkpoints
///
/// ```text
/// pre ─> system fixes ─> upgrade kernels ─┬─> [dkms pre/post] ─> initramfs ─> post-OK
///                                         └─> post-FAILED (fatal)
/// ```
pub struct KernelUpgradeOrchestrator {
    executor: Arc<dyn CommandExecutor>,
    helpers: Arc<HelperRegistry>,
    snapshots: SnapshotGuard,
    fixes: SystemFixes,
    tools: KernelTools,
}

impl KernelUpgradeOrchestrator {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        helpers: Arc<HelperRegistry>,
        snapshots: SnapshotGuard,
        fixes: SystemFixes,
        tools: KernelTools,
    ) -> Self {
        Self {
            executor,
            helpers,
            snapshots,
            fixes,
            tools,
        }
    }

    pub async fn run(&self) -> FlowOutcome {
        info!("Kernel upgrade starting, running kernel: {}", running_kernel());

        let candidates = self.tools.pending_kernel_updates().await;
        if candidates.is_empty() {
            info!("No pending kernel updates detected");
            let modules = self.tools.dkms_modules().await;
            for module in &modules {
                info!("  DKMS: {}", module);
            }
            return FlowOutcome::ok()
                .detail("kernel_updates", Vec::<KernelUpdateCandidate>::new())
                .detail("dkms_modules", modules);
        }

        info!("Pending kernel upgrades detected:");
        for candidate in &candidates {
            info!("  {}", candidate.package_line);
        }

        let mut outcome = FlowOutcome::ok().detail("kernel_updates", &candidates);
        let scope = self.snapshots.enter_async("kernel-upgrade").await;

        outcome.insert("system_fixes", self.fixes.apply().await);

        let upgraded = self.upgrade_packages(&candidates).await;
        if !upgraded.success {
            error!("Kernel package upgrade FAILED: {}", upgraded.error_text());
            scope.close(SnapshotOutcome::Failed).await;
            outcome.success = false;
            outcome.insert("error", upgraded.error_text());
            return outcome;
        }
        info!("Kernel packages upgraded successfully");

        let modules = self.tools.dkms_modules().await;
        if modules.is_empty() {
            info!("No DKMS modules registered, skipping rebuild");
        } else {
            info!("Rebuilding {} DKMS modules...", modules.len());
            let tools = &self.tools;
            let rebuilt = self
                .snapshots
                .with_snapshot_async("dkms-rebuild", async {
                    let rebuilt = tools.rebuild_dkms().await;
                    if rebuilt.success { Ok(()) } else { Err(rebuilt.error_text().to_string()) }
                })
                .await;
            if rebuilt.is_err() {
                error!("DKMS rebuild had errors, check dkms status manually");
            }
            outcome.insert("dkms_rebuilt", rebuilt.is_ok());
        }
        outcome.insert("dkms_modules", modules);

        outcome.insert("initramfs", self.tools.regenerate_initramfs().await);

        scope.close(SnapshotOutcome::Ok).await;
        info!("Kernel upgrade complete");
        outcome
    }

    async fn upgrade_packages(&self, candidates: &[KernelUpdateCandidate]) -> PhaseOutcome {
        let names: Vec<String> = candidates.iter().map(|c| c.package_name.clone()).collect();
        match self.helpers.baseline().install_cmd(&names, &IgnoreSet::new()) {
            Some(spec) => self.executor.outcome(&spec).await,
            None => PhaseOutcome::failed("baseline helper has no install action"),
        }
    }
}
