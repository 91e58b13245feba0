// src/fixer/mod.rs

//! Error-driven self-repair
//!
//! [`AutoFixer::classify_and_fix`] looks at a backend's failure text,
//! applies at most one remediation and reports whether the caller should
//! retry. The caller retries exactly once; a fix is never applied to the
//! output of its own retry.

mod rules;

pub use rules::{
    Classification, ClassifierRule, DependencyBreak, ErrorClassifier, Matcher, Remediation,
};

use crate::config::UmbrellaPackage;
use crate::exec::CommandExecutor;
use crate::helpers::HelperRegistry;
use crate::ignore::IgnoreSet;
use crate::lock::DatabaseLock;
use crate::mirror::MirrorSelector;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Applies the remediation selected by an [`ErrorClassifier`]
#[derive(Clone)]
pub struct AutoFixer {
    classifier: ErrorClassifier,
    executor: Arc<dyn CommandExecutor>,
    helpers: Arc<HelperRegistry>,
    mirrors: MirrorSelector,
    db_lock: DatabaseLock,
    /// Substring of a missing name -> package installed in its place, in order
    umbrellas: Vec<UmbrellaPackage>,
}

impl AutoFixer {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        helpers: Arc<HelperRegistry>,
        mirrors: MirrorSelector,
        db_lock: DatabaseLock,
        umbrellas: Vec<UmbrellaPackage>,
    ) -> Self {
        Self {
            classifier: ErrorClassifier::builtin(),
            executor,
            helpers,
            mirrors,
            db_lock,
            umbrellas,
        }
    }

    /// Classify `error_text` and apply its remediation
    ///
    /// Returns `true` when a remediation was applied and one retry is
    /// warranted. Unresolvable dependencies grow `ignore`.
    pub async fn classify_and_fix(&self, error_text: &str, ignore: &mut IgnoreSet) -> bool {
        let Some(classification) = self.classifier.classify(error_text) else {
            debug!("Error not auto-fixable");
            return false;
        };

        match classification {
            Classification::MirrorFailure => {
                warn!("Mirror issues detected. Re-optimizing mirrors...");
                // A retry is warranted whether or not a better list was found
                if !self.mirrors.select(None).await {
                    warn!("Mirror re-optimization failed, retrying with current mirrors");
                }
                true
            }
            Classification::UnresolvableDependency(breaks) => {
                for DependencyBreak { dependency, parent } in breaks {
                    warn!(
                        "Unresolvable dependency {} for {}. Ignoring {}",
                        dependency, parent, parent
                    );
                    ignore.insert(parent);
                }
                true
            }
            Classification::MissingTargets(packages) => {
                info!("Auto-fixing missing packages: {}", packages.join(", "));
                self.install_missing(&packages, ignore).await;
                true
            }
        }
    }

    /// The umbrella package that stands in for `name`, if any
    pub fn umbrella_for(&self, name: &str) -> Option<&str> {
        self.umbrellas
            .iter()
            .find(|umbrella| name.contains(umbrella.needle.as_str()))
            .map(|umbrella| umbrella.package.as_str())
    }

    /// Best-effort installs; individual failures are only logged
    async fn install_missing(&self, packages: &[String], ignore: &IgnoreSet) {
        self.db_lock.force_release(self.executor.as_ref()).await;

        let mut umbrellas_done: Vec<&str> = Vec::new();
        for package in packages {
            let (helper, target) = match self.umbrella_for(package) {
                Some(umbrella) => {
                    if umbrellas_done.contains(&umbrella) {
                        continue;
                    }
                    umbrellas_done.push(umbrella);
                    (self.helpers.baseline(), umbrella)
                }
                None => (
                    self.helpers.best_available(self.executor.as_ref()),
                    package.as_str(),
                ),
            };

            let Some(spec) = helper.install_cmd(&[target.to_string()], ignore) else {
                continue;
            };
            let installed = self.executor.outcome(&spec).await;
            if installed.success {
                info!("Installed {} via {}", target, helper.name);
            } else {
                debug!(
                    "Could not install {} via {}: {}",
                    target,
                    helper.name,
                    installed.error_text()
                );
            }
        }
    }
}
