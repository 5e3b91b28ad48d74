//! Background driver for sync passes.

use crate::error::{SyncError, SyncResult};
use crate::executor::{HaltReason, SyncExecutor};
use crate::orchestrator::{Subscription, SyncOrchestrator};
use crate::remote::RemoteApi;
use sitesync_core::now_millis;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Runs the executor in the background.
///
/// A pass starts when the orchestrator comes online, when the earliest
/// scheduled retry is due, every [`crate::SyncConfig::sync_interval`], and on
/// [`SyncWorker::trigger`]. Passes run on the blocking pool since the store
/// and the remote API are synchronous.
pub struct SyncWorker {
    wake: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
    _subscription: Subscription,
}

impl SyncWorker {
    /// Spawns the worker on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn<R>(orchestrator: Arc<SyncOrchestrator>, executor: Arc<SyncExecutor<R>>) -> Self
    where
        R: RemoteApi + 'static,
    {
        let wake = Arc::new(Notify::new());
        let was_online = AtomicBool::new(orchestrator.is_online());
        let on_change = Arc::clone(&wake);
        let subscription = orchestrator.subscribe(move |snapshot| {
            let before = was_online.swap(snapshot.is_online, Ordering::SeqCst);
            if snapshot.is_online && !before {
                on_change.notify_one();
            }
        });
        if orchestrator.is_online() {
            wake.notify_one();
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            orchestrator,
            executor,
            Arc::clone(&wake),
            shutdown_rx,
        ));
        info!("sync worker started");

        Self {
            wake,
            shutdown,
            handle,
            _subscription: subscription,
        }
    }

    /// Requests a pass as soon as possible.
    pub fn trigger(&self) {
        self.wake.notify_one();
    }

    /// Stops the worker after the running pass, if any.
    ///
    /// # Errors
    ///
    /// [`SyncError::Worker`] if the worker task panicked.
    pub async fn shutdown(self) -> SyncResult<()> {
        let _ = self.shutdown.send(true);
        let result = self
            .handle
            .await
            .map_err(|e| SyncError::Worker(e.to_string()));
        info!("sync worker stopped");
        result
    }
}

impl std::fmt::Debug for SyncWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncWorker")
            .field("finished", &self.handle.is_finished())
            .finish_non_exhaustive()
    }
}

/// Time to sleep before the next pass, if any timer applies.
fn next_wait<R: RemoteApi>(
    orchestrator: &SyncOrchestrator,
    executor: &SyncExecutor<R>,
) -> Option<Duration> {
    let interval = executor.config().sync_interval;
    let retry = executor
        .next_due_at(orchestrator)
        .map(|at| Duration::from_millis(at.saturating_sub(now_millis())));
    match (interval, retry) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

async fn run_loop<R>(
    orchestrator: Arc<SyncOrchestrator>,
    executor: Arc<SyncExecutor<R>>,
    wake: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) where
    R: RemoteApi + 'static,
{
    let mut resume = false;
    loop {
        // A pass cut short by the batch limit resumes after one batch pause.
        let wait = if resume {
            Some(executor.config().batch_pause)
        } else {
            next_wait(&orchestrator, &executor)
        };
        resume = false;
        tokio::select! {
            _ = shutdown.changed() => break,
            () = wake.notified() => debug!("sync worker woken"),
            () = async {
                match wait {
                    Some(d) => tokio::time::sleep(d).await,
                    None => std::future::pending().await,
                }
            } => debug!("sync worker timer fired"),
        }
        if *shutdown.borrow() {
            break;
        }
        if !orchestrator.is_online() {
            continue;
        }

        let orch = Arc::clone(&orchestrator);
        let exec = Arc::clone(&executor);
        match tokio::task::spawn_blocking(move || exec.run(&orch)).await {
            Ok(Ok(summary)) => resume = summary.halted == Some(HaltReason::BatchLimit),
            Ok(Err(SyncError::AlreadySyncing)) => {}
            Ok(Err(e)) if e.is_storage_failure() => {
                warn!(error = %e, "sync pass failed on local storage");
            }
            Ok(Err(e)) => warn!(error = %e, "sync pass failed"),
            Err(e) => warn!(error = %e, "sync pass panicked"),
        }
    }
}
