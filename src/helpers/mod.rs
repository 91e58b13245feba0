// src/helpers/mod.rs

//! Package helper registry and selection
//!
//! A helper is an external pacman-compatible frontend (pacman itself, yay,
//! paru, ...). Each exposes three parameterized actions as command templates.
//! Two distinct orderings drive selection:
//!
//! - **Best available**: the fast AUR helpers, first installed wins, pacman
//!   as the guaranteed fallback
//! - **Fallback attempts**: pacman first, then the AUR helpers, tried one by
//!   one until an install succeeds

mod catalog;

use crate::error::{Error, Result};
use crate::exec::{CommandExecutor, CommandSpec};
use crate::ignore::IgnoreSet;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Helper that is always present and performs the privileged base upgrade
pub const BASELINE_HELPER: &str = "pacman";

/// Helper bootstrapped through the baseline, used to install the others
pub const BOOTSTRAP_HELPER: &str = "yay";

/// Preference order for [`HelperRegistry::best_available`]
pub const BEST_AVAILABLE_ORDER: &[&str] = &["paru", "yay", "trizen", "pikaur", "pacaur", "pamac"];

/// Attempt order for [`HelperRegistry::install_with_fallback`]
pub const FALLBACK_ORDER: &[&str] = &[
    "pacman", "paru", "yay", "trizen", "pikaur", "pacaur", "pamac", "aurman",
];

/// The three actions every automatable helper provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum HelperAction {
    Install,
    Upgrade,
    Download,
}

/// Argument prefix that a helper action expands from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    argv: Vec<String>,
}

impl CommandTemplate {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }

    /// Expand with trailing arguments
    pub fn render(&self, extra: impl IntoIterator<Item = String>) -> CommandSpec {
        CommandSpec::new(self.argv.iter().cloned().chain(extra))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperActions {
    pub install: CommandTemplate,
    pub upgrade: CommandTemplate,
    pub download: CommandTemplate,
}

/// Immutable catalog entry for one helper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperDescriptor {
    pub name: String,
    pub is_gui: bool,
    /// Runs as root (the baseline); AUR helpers escalate on their own
    pub privileged: bool,
    actions: Option<HelperActions>,
}

impl HelperDescriptor {
    pub fn new(name: impl Into<String>, actions: HelperActions) -> Self {
        Self {
            name: name.into(),
            is_gui: false,
            privileged: false,
            actions: Some(actions),
        }
    }

    /// A GUI-only frontend with no automatable actions
    pub fn gui(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_gui: true,
            privileged: false,
            actions: None,
        }
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Eligible for automated selection
    pub fn is_automatable(&self) -> bool {
        !self.is_gui && self.actions.is_some()
    }

    /// Build the command for an action; `None` for GUI-only entries
    pub fn command(
        &self,
        action: HelperAction,
        targets: &[String],
        ignore: &IgnoreSet,
    ) -> Option<CommandSpec> {
        let actions = self.actions.as_ref()?;
        let template = match action {
            HelperAction::Install => &actions.install,
            HelperAction::Upgrade => &actions.upgrade,
            HelperAction::Download => &actions.download,
        };

        let extra = targets.iter().cloned().chain(ignore.flags());
        let mut spec = template
            .render(extra)
            .describe(format!("{} {} via {}", action, describe_targets(targets), self.name));
        if self.privileged {
            spec = spec.privileged();
        }
        Some(spec)
    }

    pub fn install_cmd(&self, targets: &[String], ignore: &IgnoreSet) -> Option<CommandSpec> {
        self.command(HelperAction::Install, targets, ignore)
    }

    pub fn upgrade_cmd(&self, ignore: &IgnoreSet) -> Option<CommandSpec> {
        self.command(HelperAction::Upgrade, &[], ignore)
    }

    pub fn download_cmd(&self, ignore: &IgnoreSet) -> Option<CommandSpec> {
        self.command(HelperAction::Download, &[], ignore)
    }
}

fn describe_targets(targets: &[String]) -> String {
    match targets.len() {
        0 => "system".to_string(),
        1..=3 => targets.join(" "),
        n => format!("{} packages", n),
    }
}

/// Result of [`HelperRegistry::install_with_fallback`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallAttempt {
    pub success: bool,
    /// Helper whose install succeeded
    pub helper: Option<String>,
}

/// Outcome of provisioning the helper set
#[derive(Debug, Clone, Default, Serialize)]
pub struct HelperEnsureReport {
    /// Already installed before the run
    pub present: Vec<String>,
    /// Installed by this run
    pub installed: Vec<String>,
    /// Could not be installed
    pub failed: Vec<String>,
}

impl HelperEnsureReport {
    /// The bootstrap helper is required; the rest are best-effort
    pub fn bootstrap_ready(&self) -> bool {
        let has = |list: &[String]| list.iter().any(|h| h == BOOTSTRAP_HELPER);
        has(&self.present) || has(&self.installed)
    }
}

/// Process-wide, read-only helper catalog plus its two priority orders
#[derive(Debug, Clone)]
pub struct HelperRegistry {
    helpers: Vec<HelperDescriptor>,
    best_order: Vec<String>,
    fallback_order: Vec<String>,
    baseline: usize,
}

impl HelperRegistry {
    /// The built-in catalog with the default orders
    pub fn builtin() -> Result<Self> {
        Self::new(
            catalog::builtin_helpers(),
            BEST_AVAILABLE_ORDER.iter().map(|s| s.to_string()).collect(),
            FALLBACK_ORDER.iter().map(|s| s.to_string()).collect(),
            BASELINE_HELPER,
        )
    }

    /// Build a registry; the baseline must be an automatable catalog entry
    pub fn new(
        helpers: Vec<HelperDescriptor>,
        best_order: Vec<String>,
        fallback_order: Vec<String>,
        baseline: &str,
    ) -> Result<Self> {
        let baseline = helpers
            .iter()
            .position(|h| h.name == baseline && h.is_automatable())
            .ok_or_else(|| {
                Error::Config(format!("baseline helper '{}' missing from catalog", baseline))
            })?;

        Ok(Self {
            helpers,
            best_order,
            fallback_order,
            baseline,
        })
    }

    pub fn get(&self, name: &str) -> Option<&HelperDescriptor> {
        self.helpers.iter().find(|h| h.name == name)
    }

    pub fn baseline(&self) -> &HelperDescriptor {
        &self.helpers[self.baseline]
    }

    pub fn is_baseline(&self, helper: &HelperDescriptor) -> bool {
        helper.name == self.baseline().name
    }

    /// Automatable helpers in catalog order
    pub fn automatable(&self) -> impl Iterator<Item = &HelperDescriptor> {
        self.helpers.iter().filter(|h| h.is_automatable())
    }

    /// Automatable helpers currently installed, in catalog order
    pub fn installed(&self, executor: &dyn CommandExecutor) -> Vec<&HelperDescriptor> {
        self.automatable()
            .filter(|h| executor.tool_available(&h.name))
            .collect()
    }

    /// First installed helper in the best-available order, else the baseline
    ///
    /// Deterministic for a given installed set: the order is fixed, not
    /// dependent on installation history.
    pub fn best_available(&self, executor: &dyn CommandExecutor) -> &HelperDescriptor {
        self.best_order
            .iter()
            .filter_map(|name| self.get(name))
            .filter(|h| h.is_automatable())
            .find(|h| executor.tool_available(&h.name))
            .unwrap_or_else(|| self.baseline())
    }

    /// The best helper when it is not the baseline
    pub fn secondary(&self, executor: &dyn CommandExecutor) -> Option<&HelperDescriptor> {
        let best = self.best_available(executor);
        (!self.is_baseline(best)).then_some(best)
    }

    /// Install `target`, trying helpers in the fallback order
    ///
    /// Helpers that are not installed or have no catalog entry are skipped.
    /// Stops at the first successful install.
    pub async fn install_with_fallback(
        &self,
        executor: &dyn CommandExecutor,
        target: &str,
        ignore: &IgnoreSet,
    ) -> InstallAttempt {
        let targets = [target.to_string()];

        for name in &self.fallback_order {
            if !executor.tool_available(name) {
                continue;
            }
            let Some(spec) = self
                .get(name)
                .and_then(|h| h.install_cmd(&targets, ignore))
            else {
                debug!("No catalog entry for helper {}, skipping", name);
                continue;
            };

            if executor.outcome(&spec).await.success {
                info!("Installed {} via {}", target, name);
                return InstallAttempt {
                    success: true,
                    helper: Some(name.clone()),
                };
            }
            debug!("{} could not install {}", name, target);
        }

        warn!("All helpers failed for package: {}", target);
        InstallAttempt {
            success: false,
            helper: None,
        }
    }

    /// Make sure the automatable helpers are installed
    ///
    /// The bootstrap helper goes in through the baseline; every other helper
    /// is installed through the bootstrap helper.
    pub async fn ensure_helpers(&self, executor: &dyn CommandExecutor) -> HelperEnsureReport {
        let mut report = HelperEnsureReport::default();
        let none = IgnoreSet::new();

        let bootstrap_ok = if executor.tool_available(BOOTSTRAP_HELPER) {
            report.present.push(BOOTSTRAP_HELPER.to_string());
            true
        } else {
            info!("Helper '{}' not found. Installing...", BOOTSTRAP_HELPER);
            self.install_helper(executor, self.baseline(), BOOTSTRAP_HELPER, &none, &mut report)
                .await
        };

        let others: Vec<&HelperDescriptor> = self
            .automatable()
            .filter(|h| h.name != BOOTSTRAP_HELPER && !self.is_baseline(h))
            .collect();

        for helper in others {
            if executor.tool_available(&helper.name) {
                report.present.push(helper.name.clone());
                continue;
            }
            match self.get(BOOTSTRAP_HELPER).filter(|_| bootstrap_ok) {
                Some(via) => {
                    info!("Attempting to install {}...", helper.name);
                    self.install_helper(executor, via, &helper.name, &none, &mut report)
                        .await;
                }
                None => {
                    warn!(
                        "Cannot install {} without {}",
                        helper.name, BOOTSTRAP_HELPER
                    );
                    report.failed.push(helper.name.clone());
                }
            }
        }

        report
    }

    async fn install_helper(
        &self,
        executor: &dyn CommandExecutor,
        via: &HelperDescriptor,
        name: &str,
        ignore: &IgnoreSet,
        report: &mut HelperEnsureReport,
    ) -> bool {
        let installed = match via.install_cmd(&[name.to_string()], ignore) {
            Some(spec) => executor.outcome(&spec).await,
            None => return false,
        };

        if installed.success {
            info!("Successfully installed '{}'.", name);
            report.installed.push(name.to_string());
            true
        } else {
            warn!("Failed to install '{}': {}", name, installed.error_text());
            report.failed.push(name.to_string());
            false
        }
    }
}
