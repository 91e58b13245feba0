// src/pipeline/mod.rs

//! Unified system update
//!
//! # Phase Sequence
//!
//! ```text
//! aio-update-full [pre]
//!   system-fixes -> (kernel detection) -> ensure-blackarch-repo -> update-keyrings
//!   -> install-metapackages -> sync-categories -> ensure-helpers
//!   -> mirror-optimization -> download-updates -> install-updates
//!   -> cleanup-orphans -> [kernel-post-tasks]
//! aio-update-full [post-OK|FAILED]
//! ```
//!
//! Every phase runs inside its own checkpoint scope and a failing phase does
//! not stop the ones after it. Only `download-updates` and `install-updates`
//! decide the run's status, and only they get a classify-and-retry cycle:
//! on failure the error text goes to the [`AutoFixer`](crate::fixer::AutoFixer)
//! and, when it applied a fix, the step is re-run exactly once. The ignore set
//! grows across the whole run, so a package excluded during the download
//! retry is also excluded from the install phase.

mod phase;

pub use phase::{Phase, PhaseResult, PipelineReport};

use crate::exec::{CommandSpec, PhaseOutcome};
use crate::helpers::HelperDescriptor;
use crate::ignore::IgnoreSet;
use crate::orchestrator::Orchestrator;
use crate::repo::builtin_categories;
use crate::snapshot::SnapshotGuard;
use std::future::Future;
use tracing::{debug, info, warn};

/// Description of the checkpoint pair around the whole update
pub const FULL_UPDATE_SCOPE: &str = "aio-update-full";

/// Run a phase body between checkpoints; the post tag follows the outcome
async fn guarded<F>(guard: &SnapshotGuard, phase: Phase, body: F) -> PhaseOutcome
where
    F: Future<Output = PhaseOutcome>,
{
    let result = guard
        .with_snapshot_async(&phase.to_string(), async {
            let outcome = body.await;
            if outcome.success { Ok(outcome) } else { Err(outcome) }
        })
        .await;

    match result {
        Ok(outcome) | Err(outcome) => outcome,
    }
}

/// One update run; owns the run's ignore set
pub struct UpdatePipeline<'a> {
    orchestrator: &'a Orchestrator,
    ignore: IgnoreSet,
    categories: Vec<String>,
    retried: Vec<Phase>,
    report: PipelineReport,
}

impl<'a> UpdatePipeline<'a> {
    pub fn new(orchestrator: &'a Orchestrator) -> Self {
        Self {
            orchestrator,
            ignore: IgnoreSet::new(),
            categories: builtin_categories(),
            retried: Vec::new(),
            report: PipelineReport::default(),
        }
    }

    pub fn ignore(&self) -> &IgnoreSet {
        &self.ignore
    }

    /// Run every phase inside the outer checkpoint pair
    pub async fn run(mut self) -> PipelineReport {
        info!("Starting unified system update");
        let guard = self.orchestrator.snapshots().clone();

        let _ = guard
            .with_snapshot_async(FULL_UPDATE_SCOPE, async {
                self.run_phases().await;
                if self.report.success() { Ok(()) } else { Err(()) }
            })
            .await;

        self.report.ignored = self.ignore.iter().map(str::to_string).collect();
        self.report.categories = self.categories;

        if self.report.success() {
            info!("Unified update complete");
        } else {
            warn!(
                "Unified update finished with failed phases: {:?}",
                self.report.failed_phases()
            );
        }
        self.report
    }

    async fn run_phases(&mut self) {
        let o = self.orchestrator;
        let guard = o.snapshots().clone();

        self.release_db_lock().await;

        let outcome = guarded(&guard, Phase::SystemFixes, self.system_fixes()).await;
        self.record(Phase::SystemFixes, outcome);

        self.report.kernel_updates = o.kernel().pending_kernel_updates().await;
        if !self.report.kernel_updates.is_empty() {
            let names: Vec<&str> = self
                .report
                .kernel_updates
                .iter()
                .map(|c| c.package_name.as_str())
                .collect();
            info!("Kernel upgrade detected in pending updates: {:?}", names);
        }

        let outcome = guarded(&guard, Phase::EnsureBlackarchRepo, o.repo().ensure_repository()).await;
        self.record(Phase::EnsureBlackarchRepo, outcome);

        self.release_db_lock().await;
        let outcome = guarded(&guard, Phase::UpdateKeyrings, o.repo().update_keyrings(&self.ignore)).await;
        self.record(Phase::UpdateKeyrings, outcome);

        let outcome = guarded(
            &guard,
            Phase::InstallMetapackages,
            o.repo().ensure_metapackages(&self.ignore),
        )
        .await;
        self.record(Phase::InstallMetapackages, outcome);

        let outcome = guarded(&guard, Phase::SyncCategories, self.sync_categories()).await;
        self.record(Phase::SyncCategories, outcome);

        self.release_db_lock().await;
        let outcome = guarded(&guard, Phase::EnsureHelpers, self.ensure_helpers()).await;
        self.record(Phase::EnsureHelpers, outcome);

        let outcome = guarded(&guard, Phase::MirrorOptimization, self.optimize_mirrors()).await;
        self.record(Phase::MirrorOptimization, outcome);

        let outcome = guarded(&guard, Phase::DownloadUpdates, self.download_updates()).await;
        self.record(Phase::DownloadUpdates, outcome);

        let outcome = guarded(&guard, Phase::InstallUpdates, self.install_updates()).await;
        self.record(Phase::InstallUpdates, outcome);

        let outcome = guarded(&guard, Phase::CleanupOrphans, self.cleanup_orphans()).await;
        self.record(Phase::CleanupOrphans, outcome);

        if !self.report.kernel_updates.is_empty() {
            info!("Running post-update kernel tasks");
            let outcome = guarded(&guard, Phase::KernelPostTasks, self.kernel_post_tasks()).await;
            self.record(Phase::KernelPostTasks, outcome);
        }
    }

    fn record(&mut self, phase: Phase, outcome: PhaseOutcome) {
        if outcome.success {
            debug!("Phase {} succeeded", phase);
        } else {
            warn!("Phase {} failed: {}", phase, outcome.error_text());
        }
        let retried = self.retried.contains(&phase);
        self.report
            .phases
            .push(PhaseResult::new(phase, outcome, retried));
    }

    async fn release_db_lock(&self) {
        let o = self.orchestrator;
        o.db_lock().force_release(o.executor()).await;
    }

    async fn system_fixes(&mut self) -> PhaseOutcome {
        let report = self.orchestrator.fixes().apply().await;
        let outcome = if report.all_ok() {
            PhaseOutcome::ok()
        } else {
            PhaseOutcome::failed("one or more system fixes failed")
        };
        self.report.system_fixes = Some(report);
        outcome
    }

    async fn sync_categories(&mut self) -> PhaseOutcome {
        self.categories = self.orchestrator.repo().sync_categories(&self.categories).await;
        PhaseOutcome::ok()
    }

    async fn ensure_helpers(&mut self) -> PhaseOutcome {
        let o = self.orchestrator;
        let helpers = o.helpers().ensure_helpers(o.executor()).await;
        let reflector = o.mirrors().ensure_reflector().await;

        let outcome = match (helpers.bootstrap_ready(), reflector) {
            (true, true) => PhaseOutcome::ok(),
            (false, _) => PhaseOutcome::failed("bootstrap helper is not available"),
            (true, false) => PhaseOutcome::failed("reflector is not available"),
        };
        self.report.helpers = Some(helpers);
        outcome
    }

    async fn optimize_mirrors(&mut self) -> PhaseOutcome {
        let selection = self.orchestrator.mirrors().select_mirrors(None).await;
        let outcome = if selection.success {
            PhaseOutcome::ok()
        } else {
            PhaseOutcome::failed("all mirror tiers failed")
        };
        self.report.mirrors = Some(selection);
        outcome
    }

    /// Classify a failure and apply its fix; `true` means retry once
    async fn autofix(&mut self, phase: Phase, failed: &PhaseOutcome) -> bool {
        if !phase.is_retryable() {
            return false;
        }
        let fixer = self.orchestrator.fixer();
        let handled = fixer
            .classify_and_fix(failed.error_text(), &mut self.ignore)
            .await;
        if handled {
            info!("Applied automatic fix, retrying {}", phase);
            self.retried.push(phase);
        }
        handled
    }

    /// The retry's text is surfaced; both are logged
    fn log_retry(phase: Phase, first: &PhaseOutcome, retry: &PhaseOutcome) {
        if retry.success {
            info!("{} succeeded after automatic fix", phase);
        } else {
            warn!("{} failed before the fix: {}", phase, first.error_text());
            warn!("{} failed again after the fix: {}", phase, retry.error_text());
        }
    }

    async fn download_updates(&mut self) -> PhaseOutcome {
        let first = self.download_once().await;
        if first.success || !self.autofix(Phase::DownloadUpdates, &first).await {
            return first;
        }

        let retry = self.download_once().await;
        Self::log_retry(Phase::DownloadUpdates, &first, &retry);
        retry
    }

    /// Baseline and secondary helper downloads, run concurrently
    async fn download_once(&self) -> PhaseOutcome {
        info!("Starting parallel download phase...");
        self.release_db_lock().await;

        let o = self.orchestrator;
        let executor = o.executor();
        let baseline = o.helpers().baseline().download_cmd(&self.ignore);
        let secondary = o
            .helpers()
            .secondary(executor)
            .and_then(|h| h.download_cmd(&self.ignore));

        let (base, aur) = tokio::join!(
            async {
                match &baseline {
                    Some(spec) => executor.outcome(spec).await,
                    None => PhaseOutcome::failed("baseline helper has no download action"),
                }
            },
            async {
                match &secondary {
                    Some(spec) => Some(executor.outcome(spec).await),
                    None => None,
                }
            }
        );

        PhaseOutcome::combine(std::iter::once(base).chain(aur))
    }

    async fn install_updates(&mut self) -> PhaseOutcome {
        info!("Starting sequential installation phase...");
        let o = self.orchestrator;

        let baseline = o.helpers().baseline();
        let installed = self.upgrade_with_retry(baseline).await;
        if !installed.success {
            return installed;
        }

        if let Some(helper) = o.helpers().secondary(o.executor()) {
            info!("Installing AUR updates ({})...", helper.name);
            let upgraded = self.upgrade_with_retry(helper).await;
            if !upgraded.success {
                warn!(
                    "{} upgrade failed, continuing: {}",
                    helper.name,
                    upgraded.error_text()
                );
                self.report
                    .tolerated
                    .push(format!("{}: {}", helper.name, upgraded.error_text()));
            }
        }

        PhaseOutcome::ok()
    }

    async fn upgrade_with_retry(&mut self, helper: &HelperDescriptor) -> PhaseOutcome {
        let first = self.upgrade_once(helper).await;
        if first.success || !self.autofix(Phase::InstallUpdates, &first).await {
            return first;
        }

        let retry = self.upgrade_once(helper).await;
        Self::log_retry(Phase::InstallUpdates, &first, &retry);
        retry
    }

    async fn upgrade_once(&self, helper: &HelperDescriptor) -> PhaseOutcome {
        self.release_db_lock().await;
        match helper.upgrade_cmd(&self.ignore) {
            Some(spec) => self.orchestrator.executor().outcome(&spec).await,
            None => PhaseOutcome::failed(format!("{} has no upgrade action", helper.name)),
        }
    }

    /// Remove packages nothing depends on any more
    async fn cleanup_orphans(&mut self) -> PhaseOutcome {
        let executor = self.orchestrator.executor();
        let query = CommandSpec::new(["pacman", "-Qdtq"]).describe("Listing orphans");

        // -Qdtq exits non-zero when there are no orphans
        let orphans: Vec<String> = match executor.run(&query).await {
            Ok(output) if output.success() => output
                .stdout
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            Ok(_) => Vec::new(),
            Err(e) => return PhaseOutcome::failed(e.to_string()),
        };

        if orphans.is_empty() {
            debug!("No orphaned packages");
            return PhaseOutcome::ok();
        }

        info!("Removing {} orphaned packages", orphans.len());
        self.release_db_lock().await;
        let remove = CommandSpec::new(["pacman", "-Rs", "--noconfirm"])
            .args(orphans)
            .privileged()
            .describe("Orphan cleanup");
        executor.outcome(&remove).await
    }

    async fn kernel_post_tasks(&mut self) -> PhaseOutcome {
        let o = self.orchestrator;
        let kernel = o.kernel();

        let modules = kernel.dkms_modules().await;
        if modules.is_empty() {
            info!("No DKMS modules, skipping rebuild");
        } else {
            info!("DKMS modules detected ({}), rebuilding...", modules.len());
            let rebuilt = o
                .snapshots()
                .with_snapshot_async("dkms-rebuild", async {
                    let rebuilt = kernel.rebuild_dkms().await;
                    if rebuilt.success { Ok(()) } else { Err(rebuilt) }
                })
                .await;
            if rebuilt.is_err() {
                warn!("DKMS rebuild had errors, check dkms status manually");
            }
            self.report.dkms_rebuilt = Some(rebuilt.is_ok());
        }

        let initramfs = kernel.regenerate_initramfs().await;
        let outcome = initramfs.outcome();
        self.report.initramfs = Some(initramfs);
        outcome
    }
}
