// src/install.rs

//! Full BlackArch installation
//!
//! 1. Make sure the helpers are installed
//! 2. Install the configured core packages with helper fallback; packages no
//!    helper can install are pinned in `IgnorePkg`
//! 3. Install every category group with the first installed helper that
//!    manages it, then re-rank mirrors

use crate::ignore::IgnoreSet;
use crate::orchestrator::Orchestrator;
use crate::repo::builtin_categories;
use crate::report::FlowOutcome;
use tracing::{error, info};

pub struct Installer<'a> {
    orchestrator: &'a Orchestrator,
}

impl<'a> Installer<'a> {
    pub fn new(orchestrator: &'a Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub async fn run(&self) -> FlowOutcome {
        let guard = self.orchestrator.snapshots().clone();
        let mut outcome = FlowOutcome::failed();

        let result = guard
            .with_snapshot_async("install-full", async {
                self.install(&mut outcome).await;
                if outcome.success { Ok(()) } else { Err(()) }
            })
            .await;

        if result.is_err() {
            error!("Installation failed or no helpers found");
        }
        outcome
    }

    async fn install(&self, outcome: &mut FlowOutcome) {
        let o = self.orchestrator;
        let guard = o.snapshots();
        let executor = o.executor();

        let helpers = guard
            .with_snapshot_async("install-ensure-helpers", async {
                o.db_lock().force_release(executor).await;
                let report = o.helpers().ensure_helpers(executor).await;
                if report.bootstrap_ready() { Ok(report) } else { Err(report) }
            })
            .await;
        outcome.insert("helpers", helpers.unwrap_or_else(|report| report));

        let problematic = guard
            .with_snapshot_async("install-fix-problematic-packages", self.fix_problematic_packages())
            .await;
        match problematic {
            Ok(()) => outcome.insert("ignored", Vec::<String>::new()),
            Err(failed) => {
                self.pin_ignored(&failed).await;
                outcome.insert("ignored", failed);
            }
        }

        let categories = o.repo().sync_categories(&builtin_categories()).await;
        info!("Preparing to install {} BlackArch categories...", categories.len());
        outcome.insert("categories", categories.len());

        let none = IgnoreSet::new();
        for helper in o.helpers().installed(executor) {
            let Some(spec) = helper.install_cmd(&categories, &none) else {
                continue;
            };

            let description = format!("install-categories-{}", helper.name);
            let installed = guard
                .with_snapshot_async(&description, async {
                    info!("Running installation with {}...", helper.name);
                    o.db_lock().force_release(executor).await;
                    let installed = executor.outcome(&spec).await;
                    if installed.success { Ok(()) } else { Err(installed) }
                })
                .await;

            match installed {
                Ok(()) => {
                    info!("Installation successful with {}", helper.name);
                    outcome.success = true;
                    outcome.insert("helper", &helper.name);

                    let mirrors = guard
                        .with_snapshot_async("install-update-mirrorlist", async {
                            let selection = o.mirrors().select_mirrors(None).await;
                            if selection.success { Ok(selection) } else { Err(selection) }
                        })
                        .await;
                    outcome.insert("mirrors", mirrors.unwrap_or_else(|selection| selection));
                    return;
                }
                Err(failed) => {
                    error!("Installation failed with {}: {}", helper.name, failed.error_text());
                }
            }
        }
    }

    /// Install each core package with fallback; `Err` lists the failures
    async fn fix_problematic_packages(&self) -> Result<(), Vec<String>> {
        let o = self.orchestrator;
        let none = IgnoreSet::new();
        let mut failed = Vec::new();

        for package in &o.config().install.packages {
            let attempt = o
                .helpers()
                .install_with_fallback(o.executor(), package, &none)
                .await;
            if !attempt.success {
                failed.push(package.clone());
            }
        }

        if failed.is_empty() { Ok(()) } else { Err(failed) }
    }

    /// Add packages to pacman.conf's IgnorePkg
    async fn pin_ignored(&self, packages: &[String]) {
        info!("Adding problematic packages to IgnorePkg: {:?}", packages);

        let repo = self.orchestrator.repo();
        let pinned = self
            .orchestrator
            .snapshots()
            .with_snapshot_async("install-pin-ignored", async {
                let pinned = repo.pin_ignored(packages).await;
                if pinned.success { Ok(()) } else { Err(pinned) }
            })
            .await;

        if let Err(failed) = pinned {
            error!("Failed to update pacman.conf: {}", failed.error_text());
        }
    }
}
