//! Stress tests for the sync engine.
//!
//! These runs enqueue from several threads while passes drain the queue
//! against an in-memory server.

use crate::harness::SyncHarness;
use sitesync_codec::Value;
use sitesync_core::SyncOperation;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Items enqueued per thread.
    pub operations: usize,
    /// Number of enqueueing threads.
    pub threads: usize,
    /// Distinct entities each thread writes to.
    pub entity_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 500,
            threads: 4,
            entity_count: 8,
        }
    }
}

/// Enqueues from `config.threads` threads while another thread runs passes,
/// then drains whatever is left.
///
/// Each thread creates its own entities, then writes increasing `version`
/// values to them, so the server must end with the highest version for
/// every entity. Failed operations count enqueues that returned an error.
pub fn stress_enqueue_while_syncing(
    harness: &SyncHarness,
    config: &StressConfig,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let writers_done = AtomicBool::new(false);
    let start = Instant::now();

    thread::scope(|scope| {
        let mut writers = Vec::with_capacity(config.threads);
        for t in 0..config.threads {
            let orchestrator = Arc::clone(&harness.orchestrator);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            writers.push(scope.spawn(move || {
                for i in 0..config.operations {
                    let entity = format!("t{t}-e{}", i % config.entity_count.max(1));
                    let version = i64::try_from(i).unwrap_or(i64::MAX);
                    let data = Value::object([("version", Value::from(version))]);
                    let operation = if i < config.entity_count {
                        SyncOperation::Create
                    } else {
                        SyncOperation::Update
                    };
                    match orchestrator.enqueue("tasks", entity, operation, data) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            }));
        }

        let writers_done = &writers_done;
        scope.spawn(move || {
            while !writers_done.load(Ordering::SeqCst) {
                let _ = harness.run_at(0);
                thread::yield_now();
            }
        });

        for writer in writers {
            let _ = writer.join();
        }
        writers_done.store(true, Ordering::SeqCst);
    });

    while harness.orchestrator.pending_syncs() > 0 {
        match harness.run_at(0) {
            Ok(summary) if summary.success == 0 => break,
            Ok(_) => {}
            Err(_) => break,
        }
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
