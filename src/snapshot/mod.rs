// src/snapshot/mod.rs

//! Transactional checkpoints around risky operations
//!
//! [`SnapshotGuard`] brackets a unit of work with a paired "pre" and "post"
//! checkpoint. The post checkpoint is tagged with the outcome of the work:
//!
//! ```text
//! "<description> [pre]"  ->  body  ->  "<description> [post-OK]"
//!                                 \->  "<description> [post-FAILED]"
//! ```
//!
//! The checkpoint backend is probed once when the guard is built. Without a
//! backend the guarded work still runs and the records are advisory only.
//! Backend errors are logged and never replace the body's own result.
//!
//! Two execution modes:
//! - [`SnapshotGuard::with_snapshot`] for synchronous call sites
//! - [`SnapshotGuard::with_snapshot_async`] for the async pipeline; each
//!   checkpoint is created on a blocking worker so concurrent siblings keep
//!   running
//!
//! Scopes are RAII values. A scope dropped without being closed (panic in a
//! blocking body, cancelled async body) still records a FAILED post.

mod snapper;

pub use snapper::SnapperBackend;

use crate::config::AioConfig;
use crate::error::Result;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

/// Creates pre/post checkpoints; calls are blocking
pub trait CheckpointBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Create a "pre" checkpoint and return its id
    fn create_pre(&self, description: &str) -> Result<u32>;

    /// Create a "post" checkpoint, paired with `pre_id` when given
    fn create_post(&self, pre_id: Option<u32>, description: &str) -> Result<u32>;
}

/// Outcome tag carried by the post checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
pub enum SnapshotOutcome {
    #[strum(serialize = "OK")]
    Ok,
    #[strum(serialize = "FAILED")]
    Failed,
}

impl SnapshotOutcome {
    pub fn from_result<T, E>(result: &std::result::Result<T, E>) -> Self {
        if result.is_ok() { Self::Ok } else { Self::Failed }
    }
}

/// One closed scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRecord {
    pub pre_id: Option<u32>,
    pub post_id: Option<u32>,
    pub description: String,
    pub outcome: SnapshotOutcome,
}

pub fn pre_tag(description: &str) -> String {
    format!("{} [pre]", description)
}

pub fn post_tag(description: &str, outcome: SnapshotOutcome) -> String {
    format!("{} [post-{}]", description, outcome)
}

type SharedBackend = Arc<dyn CheckpointBackend>;
type Journal = Arc<Mutex<Vec<SnapshotRecord>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn create_pre(backend: Option<&SharedBackend>, description: &str) -> Option<u32> {
    let backend = match backend {
        Some(b) => b,
        None => {
            debug!("No checkpoint backend, skipping pre-snapshot for {}", description);
            return None;
        }
    };

    match backend.create_pre(&pre_tag(description)) {
        Ok(id) => Some(id),
        Err(e) => {
            error!("Failed to create {} pre-snapshot: {}", backend.name(), e);
            None
        }
    }
}

fn close_scope(
    backend: Option<&SharedBackend>,
    journal: &Journal,
    description: &str,
    pre_id: Option<u32>,
    outcome: SnapshotOutcome,
) -> SnapshotRecord {
    let post_id = backend.and_then(|backend| {
        match backend.create_post(pre_id, &post_tag(description, outcome)) {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Failed to create {} post-snapshot: {}", backend.name(), e);
                None
            }
        }
    });

    let record = SnapshotRecord {
        pre_id,
        post_id,
        description: description.to_string(),
        outcome,
    };

    lock(journal).push(record.clone());
    record
}

/// Record a FAILED post off the calling thread when a runtime is present
fn post_failed_detached(guard: &SnapshotGuard, description: String, pre_id: Option<u32>) {
    let backend = guard.backend.clone();
    let journal = guard.journal.clone();
    let post = move || {
        close_scope(
            backend.as_ref(),
            &journal,
            &description,
            pre_id,
            SnapshotOutcome::Failed,
        );
    };

    // The runtime waits for blocking workers at shutdown, so an
    // interrupted run still gets its post checkpoint
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            let _ = handle.spawn_blocking(post);
        }
        Err(_) => post(),
    }
}

/// Hand-off between a pre-checkpoint worker and the task awaiting it
enum PreSlot {
    Pending,
    Created(Option<u32>),
    Abandoned,
}

/// Armed while `enter_async` waits for its pre checkpoint
///
/// Dropped armed means the caller was cancelled: whichever side finishes
/// last posts FAILED for the pre checkpoint.
struct PendingPre {
    slot: Arc<Mutex<PreSlot>>,
    guard: SnapshotGuard,
    description: String,
    armed: bool,
}

impl PendingPre {
    fn disarm(mut self) -> Option<u32> {
        self.armed = false;
        let pre_id = match *lock(&self.slot) {
            PreSlot::Created(pre_id) => pre_id,
            PreSlot::Pending | PreSlot::Abandoned => None,
        };
        pre_id
    }
}

impl Drop for PendingPre {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slot = lock(&self.slot);
        if let PreSlot::Created(pre_id) = std::mem::replace(&mut *slot, PreSlot::Abandoned) {
            post_failed_detached(&self.guard, std::mem::take(&mut self.description), pre_id);
        }
    }
}

/// Brackets work with pre/post checkpoints
#[derive(Clone, Default)]
pub struct SnapshotGuard {
    backend: Option<SharedBackend>,
    journal: Journal,
}

impl SnapshotGuard {
    pub fn new(backend: Option<SharedBackend>) -> Self {
        Self {
            backend,
            journal: Journal::default(),
        }
    }

    /// A guard whose records are advisory only
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Probe for snapper once; the answer holds for the whole run
    pub fn detect(config: &AioConfig) -> Self {
        if !config.snapshots.enabled {
            debug!("Snapshots disabled by configuration");
            return Self::disabled();
        }

        match SnapperBackend::detect(config.privilege.use_sudo) {
            Some(backend) => Self::new(Some(Arc::new(backend))),
            None => {
                warn!("snapper not available, checkpoints will be skipped");
                Self::disabled()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Every scope closed so far, in closing order
    pub fn records(&self) -> Vec<SnapshotRecord> {
        lock(&self.journal).clone()
    }

    /// Open a scope, creating the pre checkpoint on the calling thread
    pub fn enter(&self, description: &str) -> SnapshotScope {
        let pre_id = create_pre(self.backend.as_ref(), description);
        SnapshotScope {
            guard: self.clone(),
            description: description.to_string(),
            pre_id,
            closed: false,
        }
    }

    /// Run `body` between a pre and a post checkpoint (blocking)
    ///
    /// The body's result is returned unchanged after the post checkpoint.
    pub fn with_snapshot<T, E, F>(&self, description: &str, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let scope = self.enter(description);
        let result = body();
        scope.close(SnapshotOutcome::from_result(&result));
        result
    }

    /// Open a scope, creating the pre checkpoint on a blocking worker
    ///
    /// Cancelling the caller while the worker runs still pairs the pre
    /// checkpoint with a FAILED post.
    pub async fn enter_async(&self, description: &str) -> AsyncSnapshotScope {
        let pre_id = match self.backend.clone() {
            Some(backend) => {
                let slot = Arc::new(Mutex::new(PreSlot::Pending));
                let pending = PendingPre {
                    slot: slot.clone(),
                    guard: self.clone(),
                    description: description.to_string(),
                    armed: true,
                };

                let guard = self.clone();
                let tag = description.to_string();
                let joined = tokio::task::spawn_blocking(move || {
                    let pre_id = create_pre(Some(&backend), &tag);
                    let abandoned = {
                        let mut state = lock(&slot);
                        let abandoned = matches!(*state, PreSlot::Abandoned);
                        if !abandoned {
                            *state = PreSlot::Created(pre_id);
                        }
                        abandoned
                    };
                    if abandoned {
                        close_scope(
                            guard.backend.as_ref(),
                            &guard.journal,
                            &tag,
                            pre_id,
                            SnapshotOutcome::Failed,
                        );
                    }
                })
                .await;
                if let Err(e) = joined {
                    error!("Pre-snapshot worker failed: {}", e);
                }
                pending.disarm()
            }
            None => create_pre(None, description),
        };

        AsyncSnapshotScope {
            guard: self.clone(),
            description: description.to_string(),
            pre_id,
            closed: false,
        }
    }

    /// Run `body` between a pre and a post checkpoint without blocking the scheduler
    pub async fn with_snapshot_async<T, E, F>(
        &self,
        description: &str,
        body: F,
    ) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
    {
        let scope = self.enter_async(description).await;
        let result = body.await;
        scope.close(SnapshotOutcome::from_result(&result)).await;
        result
    }
}

/// Open blocking scope; closes as FAILED if dropped unclosed
pub struct SnapshotScope {
    guard: SnapshotGuard,
    description: String,
    pre_id: Option<u32>,
    closed: bool,
}

impl SnapshotScope {
    pub fn pre_id(&self) -> Option<u32> {
        self.pre_id
    }

    /// Create the post checkpoint with the given outcome
    pub fn close(mut self, outcome: SnapshotOutcome) -> SnapshotRecord {
        self.finish(outcome)
    }

    fn finish(&mut self, outcome: SnapshotOutcome) -> SnapshotRecord {
        self.closed = true;
        close_scope(
            self.guard.backend.as_ref(),
            &self.guard.journal,
            &self.description,
            self.pre_id,
            outcome,
        )
    }
}

impl Drop for SnapshotScope {
    fn drop(&mut self) {
        if !self.closed {
            self.finish(SnapshotOutcome::Failed);
        }
    }
}

/// Open async scope; closes as FAILED on a blocking worker if dropped unclosed
pub struct AsyncSnapshotScope {
    guard: SnapshotGuard,
    description: String,
    pre_id: Option<u32>,
    closed: bool,
}

impl AsyncSnapshotScope {
    pub fn pre_id(&self) -> Option<u32> {
        self.pre_id
    }

    /// Create the post checkpoint with the given outcome on a blocking worker
    pub async fn close(mut self, outcome: SnapshotOutcome) -> SnapshotRecord {
        self.closed = true;
        let backend = self.guard.backend.clone();
        let journal = self.guard.journal.clone();
        let description = std::mem::take(&mut self.description);
        let pre_id = self.pre_id;

        if backend.is_none() {
            return close_scope(None, &journal, &description, pre_id, outcome);
        }

        let fallback = SnapshotRecord {
            pre_id,
            post_id: None,
            description: description.clone(),
            outcome,
        };
        tokio::task::spawn_blocking(move || {
            close_scope(backend.as_ref(), &journal, &description, pre_id, outcome)
        })
        .await
        .unwrap_or_else(|e| {
            error!("Post-snapshot worker failed: {}", e);
            fallback
        })
    }
}

impl Drop for AsyncSnapshotScope {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        post_failed_detached(&self.guard, std::mem::take(&mut self.description), self.pre_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(pre_tag("download-updates"), "download-updates [pre]");
        assert_eq!(
            post_tag("download-updates", SnapshotOutcome::Ok),
            "download-updates [post-OK]"
        );
        assert_eq!(
            post_tag("download-updates", SnapshotOutcome::Failed),
            "download-updates [post-FAILED]"
        );
    }

    #[test]
    fn test_disabled_guard_still_runs_body() {
        let guard = SnapshotGuard::disabled();
        assert!(!guard.is_available());

        let result: std::result::Result<u8, String> = guard.with_snapshot("noop", || Ok(7));
        assert_eq!(result, Ok(7));

        let result: std::result::Result<u8, String> =
            guard.with_snapshot("broken", || Err("boom".to_string()));
        assert_eq!(result, Err("boom".to_string()));

        let records = guard.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].outcome, SnapshotOutcome::Ok);
        assert_eq!(records[1].outcome, SnapshotOutcome::Failed);
        assert!(records.iter().all(|r| r.pre_id.is_none() && r.post_id.is_none()));
    }

    #[test]
    fn test_dropped_scope_records_failure() {
        let guard = SnapshotGuard::disabled();
        {
            let _scope = guard.enter("interrupted");
        }
        let records = guard.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].description, "interrupted");
        assert_eq!(records[0].outcome, SnapshotOutcome::Failed);
    }
}
