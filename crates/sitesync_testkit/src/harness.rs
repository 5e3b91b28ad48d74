//! End-to-end sync harness.
//!
//! Wires a [`TestStore`], a [`SyncOrchestrator`], a [`SyncExecutor`] and an
//! [`InMemoryRemote`] together, and can simulate an application restart
//! while keeping the server state.

use crate::fixtures::TestStore;
use sitesync_sync_engine::{
    InMemoryRemote, RetryConfig, SyncConfig, SyncExecutor, SyncOrchestrator, SyncResult,
    SyncSummary,
};
use std::sync::Arc;
use std::time::Duration;

/// A client session against an in-memory server.
pub struct SyncHarness {
    /// Durable store of the client.
    pub store: TestStore,
    /// Session orchestrator, online.
    pub orchestrator: Arc<SyncOrchestrator>,
    /// Executor replaying against [`SyncHarness::remote`].
    pub executor: SyncExecutor<Arc<InMemoryRemote>>,
    /// The server.
    pub remote: Arc<InMemoryRemote>,
}

impl SyncHarness {
    /// Creates an online session with deterministic retry timing: three
    /// attempts, one second initial delay, no jitter.
    pub fn new() -> Self {
        Self::with_config(Self::default_config())
    }

    /// Creates an online session with `config`.
    pub fn with_config(config: SyncConfig) -> Self {
        Self::assemble(TestStore::memory(), Arc::new(InMemoryRemote::new()), config)
    }

    /// Deterministic configuration used by [`SyncHarness::new`].
    pub fn default_config() -> SyncConfig {
        SyncConfig::new().with_retry(
            RetryConfig::new(3)
                .with_initial_delay(Duration::from_secs(1))
                .with_jitter(false),
        )
    }

    fn assemble(store: TestStore, remote: Arc<InMemoryRemote>, config: SyncConfig) -> Self {
        let orchestrator = Arc::new(store.orchestrator());
        orchestrator.set_online(true);
        let executor = SyncExecutor::new(config, Arc::clone(&remote));
        Self {
            store,
            orchestrator,
            executor,
            remote,
        }
    }

    /// Runs one pass as of `now`.
    pub fn run_at(&self, now: u64) -> SyncResult<SyncSummary> {
        self.executor.run_at(&self.orchestrator, now)
    }

    /// Simulates closing and reopening the application: the store is
    /// reopened from its bytes and a fresh session loads it. Server state is
    /// kept.
    ///
    /// # Panics
    ///
    /// Panics if a clone of the orchestrator is still alive.
    pub fn restart(self) -> Self {
        let Self {
            store,
            orchestrator,
            executor,
            remote,
        } = self;
        let config = executor.config().clone();
        drop(executor);
        assert!(
            Arc::strong_count(&orchestrator) == 1,
            "orchestrator still shared; drop clones before restarting"
        );
        drop(orchestrator);
        Self::assemble(store.reopen(), remote, config)
    }
}

impl Default for SyncHarness {
    fn default() -> Self {
        Self::new()
    }
}
