// src/pipeline/phase.rs

//! Update phases and their results

use crate::exec::PhaseOutcome;
use crate::helpers::HelperEnsureReport;
use crate::kernel::{InitramfsReport, KernelUpdateCandidate};
use crate::mirror::MirrorSelection;
use crate::report::FlowOutcome;
use crate::system_fixes::SystemFixReport;
use serde::Serialize;

/// One ordered unit of the update, in execution order
///
/// The display form is also the checkpoint description.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    strum_macros::Display,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Phase {
    SystemFixes,
    EnsureBlackarchRepo,
    UpdateKeyrings,
    InstallMetapackages,
    SyncCategories,
    EnsureHelpers,
    MirrorOptimization,
    DownloadUpdates,
    InstallUpdates,
    CleanupOrphans,
    KernelPostTasks,
}

impl Phase {
    /// A failure here marks the whole run failed; other phases are best-effort
    pub fn is_critical(self) -> bool {
        matches!(self, Phase::DownloadUpdates | Phase::InstallUpdates)
    }

    /// Phases that get one classify-and-retry cycle
    pub fn is_retryable(self) -> bool {
        matches!(self, Phase::DownloadUpdates | Phase::InstallUpdates)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseResult {
    pub phase: Phase,
    pub success: bool,
    pub retried: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PhaseResult {
    pub fn new(phase: Phase, outcome: PhaseOutcome, retried: bool) -> Self {
        Self {
            phase,
            success: outcome.success,
            retried,
            error: outcome.error_text,
        }
    }
}

/// Everything one pipeline run found and did
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub phases: Vec<PhaseResult>,
    pub kernel_updates: Vec<KernelUpdateCandidate>,
    /// Final ignore set of the run
    pub ignored: Vec<String>,
    /// Helper upgrade failures that did not fail the install phase
    pub tolerated: Vec<String>,
    pub categories: Vec<String>,
    pub system_fixes: Option<SystemFixReport>,
    pub helpers: Option<HelperEnsureReport>,
    pub mirrors: Option<MirrorSelection>,
    pub dkms_rebuilt: Option<bool>,
    pub initramfs: Option<InitramfsReport>,
}

impl PipelineReport {
    pub fn success(&self) -> bool {
        self.phases
            .iter()
            .filter(|r| r.phase.is_critical())
            .all(|r| r.success)
    }

    pub fn result(&self, phase: Phase) -> Option<&PhaseResult> {
        self.phases.iter().find(|r| r.phase == phase)
    }

    pub fn failed_phases(&self) -> Vec<Phase> {
        self.phases
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.phase)
            .collect()
    }

    pub fn into_outcome(self) -> FlowOutcome {
        let mut outcome = FlowOutcome::new(self.success());
        outcome.insert("failed_phases", self.failed_phases());
        outcome.insert("phases", &self.phases);
        outcome.insert("kernel_updates", &self.kernel_updates);
        outcome.insert("ignored", &self.ignored);
        outcome.insert("categories", self.categories.len());
        if !self.tolerated.is_empty() {
            outcome.insert("tolerated", &self.tolerated);
        }
        if let Some(fixes) = &self.system_fixes {
            outcome.insert("system_fixes", fixes);
        }
        if let Some(helpers) = &self.helpers {
            outcome.insert("helpers", helpers);
        }
        if let Some(mirrors) = &self.mirrors {
            outcome.insert("mirrors", mirrors);
        }
        if let Some(rebuilt) = self.dkms_rebuilt {
            outcome.insert("dkms_rebuilt", rebuilt);
        }
        if let Some(initramfs) = &self.initramfs {
            outcome.insert("initramfs", initramfs);
        }
        outcome
    }
}
