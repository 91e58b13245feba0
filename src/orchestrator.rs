// src/orchestrator.rs

//! Component wiring and the public entry points
//!
//! An [`Orchestrator`] is built once per process from the loaded
//! configuration. Each `run_*` method is one user-facing flow and returns a
//! [`FlowOutcome`]; none of them exit the process or handle signals.

use crate::config::AioConfig;
use crate::error::Result;
use crate::exec::{CommandExecutor, SystemExecutor};
use crate::fixer::AutoFixer;
use crate::helpers::HelperRegistry;
use crate::install::Installer;
use crate::kernel::{KernelTools, KernelUpgradeOrchestrator};
use crate::lock::{DatabaseLock, RunLock};
use crate::mirror::{GeoLocator, IpInfoLocator, MirrorSelector};
use crate::pipeline::UpdatePipeline;
use crate::repo::RepoManager;
use crate::report::{self, FlowOutcome, RunStatus};
use crate::snapshot::SnapshotGuard;
use crate::system_fixes::SystemFixes;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct Orchestrator {
    config: Arc<AioConfig>,
    executor: Arc<dyn CommandExecutor>,
    helpers: Arc<HelperRegistry>,
    snapshots: SnapshotGuard,
    mirrors: MirrorSelector,
    fixer: AutoFixer,
    repo: RepoManager,
    kernel: KernelTools,
    fixes: SystemFixes,
    db_lock: DatabaseLock,
}

impl Orchestrator {
    /// Wire the real executor, geolocation service and snapper probe
    pub fn from_system(config: AioConfig) -> Result<Self> {
        let executor = Arc::new(SystemExecutor::new(config.privilege.use_sudo));
        let locator = Arc::new(IpInfoLocator::new(
            config.mirrors.geolocation_url.clone(),
            config.mirrors.geolocation_timeout(),
        )?);
        let snapshots = SnapshotGuard::detect(&config);
        Self::new(config, executor, locator, snapshots)
    }

    pub fn new(
        config: AioConfig,
        executor: Arc<dyn CommandExecutor>,
        locator: Arc<dyn GeoLocator>,
        snapshots: SnapshotGuard,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let helpers = Arc::new(HelperRegistry::builtin()?);

        let db_lock = DatabaseLock::new(
            config.paths.db_lock.clone(),
            config.update.competing_processes.clone(),
        );
        let mirrors = MirrorSelector::new(
            config.clone(),
            executor.clone(),
            helpers.clone(),
            locator,
        );
        let fixer = AutoFixer::new(
            executor.clone(),
            helpers.clone(),
            mirrors.clone(),
            db_lock.clone(),
            config.update.umbrella_packages.clone(),
        );
        let repo = RepoManager::new(config.clone(), executor.clone(), helpers.clone());
        let kernel = KernelTools::new(executor.clone(), config.paths.modules_dir.clone());
        let fixes = SystemFixes::new(executor.clone(), config.paths.clone());

        Ok(Self {
            config,
            executor,
            helpers,
            snapshots,
            mirrors,
            fixer,
            repo,
            kernel,
            fixes,
            db_lock,
        })
    }

    pub fn config(&self) -> &AioConfig {
        &self.config
    }

    pub fn executor(&self) -> &dyn CommandExecutor {
        self.executor.as_ref()
    }

    pub fn helpers(&self) -> &HelperRegistry {
        &self.helpers
    }

    pub fn snapshots(&self) -> &SnapshotGuard {
        &self.snapshots
    }

    pub fn mirrors(&self) -> &MirrorSelector {
        &self.mirrors
    }

    pub fn fixer(&self) -> &AutoFixer {
        &self.fixer
    }

    pub fn repo(&self) -> &RepoManager {
        &self.repo
    }

    pub fn kernel(&self) -> &KernelTools {
        &self.kernel
    }

    pub fn fixes(&self) -> &SystemFixes {
        &self.fixes
    }

    pub fn db_lock(&self) -> &DatabaseLock {
        &self.db_lock
    }

    fn lock_run(&self) -> std::result::Result<RunLock, FlowOutcome> {
        RunLock::try_acquire(&self.config.paths.run_lock).map_err(|e| {
            error!("{}", e);
            FlowOutcome::failed().detail("error", e.to_string())
        })
    }

    /// Full system update; always leaves a completion marker
    pub async fn run_update(&self) -> FlowOutcome {
        let marker = &self.config.paths.completion_marker;
        if let Err(e) = report::remove_completion_marker(marker) {
            warn!("Could not remove {}: {}", marker.display(), e);
        }

        let outcome = match self.lock_run() {
            Ok(_lock) => UpdatePipeline::new(self).run().await.into_outcome(),
            Err(outcome) => outcome,
        };

        self.mark_complete(outcome.status());
        outcome
    }

    /// Write the completion marker; failures are only logged
    pub fn mark_complete(&self, status: RunStatus) {
        let marker = &self.config.paths.completion_marker;
        match report::write_completion_marker(marker, status) {
            Ok(()) => info!("Completion marker written to {}", marker.display()),
            Err(e) => error!("Could not write {}: {}", marker.display(), e),
        }
    }

    pub async fn run_kernel_upgrade(&self) -> FlowOutcome {
        let _lock = match self.lock_run() {
            Ok(lock) => lock,
            Err(outcome) => return outcome,
        };

        KernelUpgradeOrchestrator::new(
            self.executor.clone(),
            self.helpers.clone(),
            self.snapshots.clone(),
            self.fixes.clone(),
            self.kernel.clone(),
        )
        .run()
        .await
    }

    pub async fn run_mirror_optimize(&self, country: Option<&str>) -> FlowOutcome {
        let _lock = match self.lock_run() {
            Ok(lock) => lock,
            Err(outcome) => return outcome,
        };

        let mirrors = &self.mirrors;
        let selection = self
            .snapshots
            .with_snapshot_async("update-mirrorlist", async {
                let selection = mirrors.select_mirrors(country).await;
                if selection.success { Ok(selection) } else { Err(selection) }
            })
            .await;

        match selection {
            Ok(selection) => FlowOutcome::ok().detail("mirrors", selection),
            Err(selection) => FlowOutcome::failed().detail("mirrors", selection),
        }
    }

    /// Install missing helpers; succeeds when the bootstrap helper is present
    pub async fn run_helper_ensure(&self) -> FlowOutcome {
        let _lock = match self.lock_run() {
            Ok(lock) => lock,
            Err(outcome) => return outcome,
        };

        let report = self
            .snapshots
            .with_snapshot_async("fix-helpers", async {
                self.db_lock.force_release(self.executor()).await;
                let report = self.helpers.ensure_helpers(self.executor()).await;
                if !report.failed.is_empty() {
                    warn!("Helpers that could not be installed: {:?}", report.failed);
                }
                if report.bootstrap_ready() { Ok(report) } else { Err(report) }
            })
            .await;

        match report {
            Ok(report) => FlowOutcome::ok().detail("helpers", report),
            Err(report) => FlowOutcome::failed().detail("helpers", report),
        }
    }

    pub async fn run_system_fixes(&self) -> FlowOutcome {
        let _lock = match self.lock_run() {
            Ok(lock) => lock,
            Err(outcome) => return outcome,
        };

        let fixes = &self.fixes;
        let report = self
            .snapshots
            .with_snapshot_async("system-fixes", async {
                let report = fixes.apply().await;
                if report.all_ok() { Ok(report) } else { Err(report) }
            })
            .await;

        match report {
            Ok(report) => FlowOutcome::ok().detail("system_fixes", report),
            Err(report) => FlowOutcome::failed().detail("system_fixes", report),
        }
    }

    pub async fn run_install(&self) -> FlowOutcome {
        let _lock = match self.lock_run() {
            Ok(lock) => lock,
            Err(outcome) => return outcome,
        };

        Installer::new(self).run().await
    }
}
