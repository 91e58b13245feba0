// src/lib.rs

//! BlackArch system-update orchestration
//!
//! Drives external package tools (pacman and the AUR helpers), `reflector`,
//! `snapper`, `dkms` and `dracut` to keep a BlackArch install current.
//! Nothing here resolves packages itself: the library decides which tool to
//! run, in what order, what to retry, and which checkpoints to take around it.
//!
//! # Architecture
//!
//! - [`mirror`]: tiered, geolocation-aware mirror ranking
//! - [`helpers`]: helper catalog, selection and install fallback
//! - [`snapshot`]: pre/post checkpoint scopes around risky work
//! - [`fixer`]: failure classification and one-shot remediation
//! - [`pipeline`]: the phase sequencer behind `update`
//! - [`kernel`]: kernel detection, DKMS and initramfs, standalone upgrade flow
//! - [`orchestrator`]: wiring plus one entry point per user-facing flow

pub mod config;
mod error;
pub mod exec;
pub mod fixer;
pub mod helpers;
pub mod ignore;
pub mod install;
pub mod kernel;
pub mod lock;
pub mod mirror;
pub mod orchestrator;
pub mod pipeline;
pub mod repo;
pub mod report;
pub mod snapshot;
pub mod system_fixes;

pub use config::{AioConfig, DEFAULT_CONFIG_PATH};
pub use error::{Error, Result};
pub use exec::{CommandExecutor, CommandOutput, CommandSpec, PhaseOutcome, SystemExecutor};
pub use fixer::{AutoFixer, Classification, ErrorClassifier};
pub use helpers::{HelperDescriptor, HelperRegistry, InstallAttempt};
pub use ignore::IgnoreSet;
pub use mirror::{GeoLocation, GeoLocator, MirrorSelector};
pub use orchestrator::Orchestrator;
pub use pipeline::{Phase, PipelineReport, UpdatePipeline};
pub use report::{FlowOutcome, RunReport, RunStatus};
pub use snapshot::{CheckpointBackend, SnapshotGuard, SnapshotOutcome, SnapshotRecord};
