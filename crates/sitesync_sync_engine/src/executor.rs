//! Queue replay against the remote API.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::orchestrator::{SyncOrchestrator, SyncPass};
use crate::remote::{ApplyOutcome, ApplyRequest, RemoteApi};
use crate::state::{SyncProgress, SyncStats};
use parking_lot::RwLock;
use sitesync_core::{now_millis, ConflictRecord, EntityKey, PendingSyncItem, UnixMillis};
use std::collections::HashSet;
use std::thread;
use tracing::{debug, info, warn};

/// Why a pass stopped before working through the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// The orchestrator was offline when the pass was requested.
    Offline,
    /// Unresolved conflicts exist, or one was detected during the pass.
    Conflicts,
    /// Connectivity dropped during the pass.
    Cancelled,
    /// [`SyncConfig::max_batches`] batches were sent; the rest waits for the
    /// next pass.
    BatchLimit,
}

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Items applied and removed from the queue.
    pub success: usize,
    /// Items marked failed for good during this pass.
    pub failed: usize,
    /// Items still queued when the pass ended.
    pub remaining: usize,
    /// Conflicts detected during this pass.
    pub conflicts: usize,
    /// Items waiting for a scheduled retry.
    pub deferred: usize,
    /// Set when the pass stopped early.
    pub halted: Option<HaltReason>,
}

impl SyncSummary {
    /// The pass went through the whole queue.
    pub fn is_complete(&self) -> bool {
        self.halted.is_none()
    }
}

enum Step {
    Applied,
    Retry,
    Failed,
    Conflict,
    /// The item was removed from the queue while it was being replayed.
    Removed,
}

/// Replays the queue of a [`SyncOrchestrator`] against a [`RemoteApi`].
///
/// A pass works through the queue in `(timestamp, id)` order, sending
/// batches of [`SyncConfig::batch_size`] requests with
/// [`SyncConfig::batch_pause`] between them and at most
/// [`SyncConfig::max_batches`] batches per pass:
///
/// - nothing is submitted while any conflict is active
/// - a detected conflict ends the pass
/// - an entity whose earliest remaining item is not applied (retry pending,
///   failed for good) is skipped for the rest of the pass, so a later edit
///   never overtakes an earlier one
/// - going offline stops the pass before the next item
///
/// Per-item failures are recorded on the item; only store failures are
/// returned as errors.
pub struct SyncExecutor<R: RemoteApi> {
    config: SyncConfig,
    remote: R,
    stats: RwLock<SyncStats>,
}

impl<R: RemoteApi> SyncExecutor<R> {
    /// Creates an executor.
    pub fn new(config: SyncConfig, remote: R) -> Self {
        Self {
            config,
            remote,
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Executor configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The remote API.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Counters since creation.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Runs a pass using the system clock.
    pub fn run(&self, orchestrator: &SyncOrchestrator) -> SyncResult<SyncSummary> {
        self.run_at(orchestrator, now_millis())
    }

    /// Runs a pass as of `now`.
    ///
    /// Returns a halted summary when offline. Safe to call with an empty
    /// queue.
    ///
    /// # Errors
    ///
    /// [`SyncError::AlreadySyncing`] while another pass runs; store errors.
    pub fn run_at(
        &self,
        orchestrator: &SyncOrchestrator,
        now: UnixMillis,
    ) -> SyncResult<SyncSummary> {
        let pass = match orchestrator.begin_sync() {
            Ok(pass) => pass,
            Err(SyncError::Offline) => {
                debug!("offline, sync pass skipped");
                return Ok(SyncSummary {
                    remaining: orchestrator.pending_syncs(),
                    halted: Some(HaltReason::Offline),
                    ..SyncSummary::default()
                });
            }
            Err(e) => return Err(e),
        };

        let result = self.drain(orchestrator, &pass, now);
        let completed = matches!(&result, Ok(summary) if summary.is_complete());
        orchestrator.finish_sync(pass, completed);
        self.stats.write().last_pass_at = Some(now);

        match &result {
            Ok(summary) => info!(
                success = summary.success,
                failed = summary.failed,
                remaining = summary.remaining,
                conflicts = summary.conflicts,
                deferred = summary.deferred,
                halted = ?summary.halted,
                "sync pass finished"
            ),
            Err(e) => warn!(error = %e, "sync pass aborted by store failure"),
        }
        result
    }

    /// Earliest scheduled retry among the loaded queue.
    pub fn next_due_at(&self, orchestrator: &SyncOrchestrator) -> Option<UnixMillis> {
        orchestrator
            .sync_queue()
            .iter()
            .filter(|item| !item.is_terminal())
            .filter_map(|item| item.next_attempt_at)
            .min()
    }

    fn drain(
        &self,
        orchestrator: &SyncOrchestrator,
        pass: &SyncPass,
        now: UnixMillis,
    ) -> SyncResult<SyncSummary> {
        orchestrator.load_conflicts()?;
        orchestrator.load_sync_queue()?;

        let mut summary = SyncSummary::default();
        let active = orchestrator.conflict_count();
        if active > 0 {
            info!(conflicts = active, "sync paused until conflicts are resolved");
            summary.remaining = orchestrator.pending_syncs();
            summary.halted = Some(HaltReason::Conflicts);
            return Ok(summary);
        }
        self.stats.write().passes += 1;

        let queue = orchestrator.sync_queue();
        let mut progress = SyncProgress::new(queue.iter().filter(|i| i.is_due(now)).count());
        orchestrator.update_progress(pass, progress.clone());
        let mut blocked: HashSet<EntityKey> = HashSet::new();

        let batch_size = self.config.batch_size.max(1);
        let (mut batch, mut in_batch) = (0usize, 0usize);
        for item in &queue {
            if !orchestrator.is_current(pass) {
                summary.halted = Some(HaltReason::Cancelled);
                break;
            }
            let key = item.entity_key();
            if blocked.contains(&key) {
                continue;
            }
            if !item.is_due(now) {
                if !item.is_terminal() {
                    summary.deferred += 1;
                }
                blocked.insert(key);
                continue;
            }

            if in_batch == batch_size {
                debug!(batch, size = in_batch, "batch done");
                batch += 1;
                in_batch = 0;
                if self.config.max_batches.is_some_and(|max| batch >= max) {
                    summary.halted = Some(HaltReason::BatchLimit);
                    break;
                }
                if !self.config.batch_pause.is_zero() {
                    thread::sleep(self.config.batch_pause);
                    if !orchestrator.is_current(pass) {
                        summary.halted = Some(HaltReason::Cancelled);
                        break;
                    }
                }
            }
            in_batch += 1;

            progress.current = Some(item.id.clone());
            orchestrator.update_progress(pass, progress.clone());
            let step = self.replay(orchestrator, item.clone(), now)?;
            progress.processed += 1;
            progress.current = None;
            match step {
                Step::Applied => {
                    summary.success += 1;
                    progress.succeeded += 1;
                }
                Step::Retry => {
                    summary.deferred += 1;
                    progress.failed += 1;
                    blocked.insert(key);
                }
                Step::Failed => {
                    summary.failed += 1;
                    progress.failed += 1;
                    blocked.insert(key);
                }
                Step::Conflict => {
                    summary.conflicts += 1;
                    summary.halted = Some(HaltReason::Conflicts);
                    break;
                }
                Step::Removed => {}
            }
            orchestrator.update_progress(pass, progress.clone());
        }
        if in_batch > 0 {
            debug!(batch, size = in_batch, "batch done");
        }

        if summary.halted.is_none() && !orchestrator.is_current(pass) {
            summary.halted = Some(HaltReason::Cancelled);
        }
        summary.remaining = orchestrator.pending_syncs();
        Ok(summary)
    }

    fn replay(
        &self,
        orchestrator: &SyncOrchestrator,
        mut item: PendingSyncItem,
        now: UnixMillis,
    ) -> SyncResult<Step> {
        item.begin_attempt();
        if !orchestrator.update_item(&item)? {
            debug!(id = %item.id, "item removed before replay");
            return Ok(Step::Removed);
        }
        let request = ApplyRequest::from(&item);
        debug!(id = %item.id, entity = %item.entity_key(), op = %item.operation, force = item.force, "replaying item");

        // Post-request writes skip items removed while in flight.
        match self.remote.apply(&request) {
            ApplyOutcome::Applied => {
                orchestrator.complete_item(&item.id)?;
                self.stats.write().applied += 1;
                Ok(Step::Applied)
            }
            ApplyOutcome::Conflict { server_data } => {
                item.requeue();
                if !orchestrator.update_item(&item)? {
                    debug!(id = %item.id, "item removed during replay, conflict dropped");
                    return Ok(Step::Removed);
                }
                let conflict = ConflictRecord::for_item(&item, server_data, now);
                orchestrator.record_conflict(&conflict)?;
                self.stats.write().conflicts += 1;
                warn!(
                    id = %item.id,
                    conflict = %conflict.id,
                    entity = %item.entity_key(),
                    fields = conflict.field_conflicts.len(),
                    "conflict detected, halting sync"
                );
                Ok(Step::Conflict)
            }
            ApplyOutcome::Failed(failure)
                if failure.is_retryable()
                    && !self.config.retry.is_exhausted(item.retry_count.saturating_add(1)) =>
            {
                let delay = self
                    .config
                    .retry
                    .delay_for_attempt(item.retry_count.saturating_add(1));
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                item.schedule_retry(now.saturating_add(delay_ms), failure.to_string());
                if !orchestrator.update_item(&item)? {
                    debug!(id = %item.id, "item removed during replay");
                    return Ok(Step::Removed);
                }
                let mut stats = self.stats.write();
                stats.retries += 1;
                stats.last_error = Some(failure.to_string());
                debug!(id = %item.id, attempt = item.retry_count, delay_ms, error = %failure, "retry scheduled");
                Ok(Step::Retry)
            }
            ApplyOutcome::Failed(failure) => {
                item.fail(failure.to_string());
                if !orchestrator.update_item(&item)? {
                    debug!(id = %item.id, "item removed during replay");
                    return Ok(Step::Removed);
                }
                let mut stats = self.stats.write();
                stats.failed += 1;
                stats.last_error = Some(failure.to_string());
                warn!(id = %item.id, entity = %item.entity_key(), attempts = item.retry_count, error = %failure, "item failed");
                Ok(Step::Failed)
            }
        }
    }
}

impl<R: RemoteApi> std::fmt::Debug for SyncExecutor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncExecutor")
            .field("config", &self.config)
            .field("stats", &*self.stats.read())
            .finish_non_exhaustive()
    }
}
