//! Inspect command implementation.

use super::{format_size, open_store, CliResult, Format};
use serde::Serialize;
use sitesync_core::{ConflictRecord, DurableStore, PendingSyncItem, SyncStatus};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Size of the record log.
    pub log_bytes: u64,
    /// Bytes a compacted log would occupy.
    pub live_bytes: u64,
    /// Bytes held by superseded records.
    pub garbage_bytes: u64,
    /// Records in the log, superseded ones included.
    pub log_records: u64,
    /// Live records per store.
    pub stores: BTreeMap<String, usize>,
    /// Queued items by state.
    pub queue: QueueBreakdown,
    /// Unresolved conflicts.
    pub active_conflicts: usize,
    /// Conflicts kept for history.
    pub resolved_conflicts: usize,
}

/// Queued items by replay state.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct QueueBreakdown {
    /// Waiting for their first attempt.
    pub pending: usize,
    /// Marked in flight; an interrupted attempt if nothing is running.
    pub in_progress: usize,
    /// Failed with a retry scheduled.
    pub retry_scheduled: usize,
    /// Failed for good.
    pub failed: usize,
}

/// Collects statistics from an open store.
pub fn inspect(store: &DurableStore) -> CliResult<InspectResult> {
    let stats = store.stats()?;

    let mut queue = QueueBreakdown::default();
    for item in store.all_records::<PendingSyncItem>()? {
        match item.status {
            SyncStatus::Pending => queue.pending += 1,
            SyncStatus::InProgress => queue.in_progress += 1,
            SyncStatus::Failed if item.is_terminal() => queue.failed += 1,
            SyncStatus::Failed => queue.retry_scheduled += 1,
            SyncStatus::Done => {}
        }
    }

    let conflicts = store.all_records::<ConflictRecord>()?;
    let active_conflicts = conflicts.iter().filter(|c| c.is_active()).count();

    Ok(InspectResult {
        path: store
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        log_bytes: stats.log_bytes,
        live_bytes: stats.live_bytes,
        garbage_bytes: stats.garbage_bytes(),
        log_records: stats.log_records,
        stores: stats.stores,
        queue,
        active_conflicts,
        resolved_conflicts: conflicts.len() - active_conflicts,
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: Format, out: &mut dyn Write) -> CliResult<()> {
    let store = open_store(path)?;
    let result = inspect(&store)?;

    match format {
        Format::Json => writeln!(out, "{}", serde_json::to_string_pretty(&result)?)?,
        Format::Text => print_text_output(&result, out)?,
    }
    Ok(())
}

fn print_text_output(result: &InspectResult, out: &mut dyn Write) -> CliResult<()> {
    writeln!(out, "sitesync store inspection")?;
    writeln!(out, "=========================")?;
    writeln!(out)?;
    writeln!(out, "Path: {}", result.path)?;
    writeln!(out)?;
    writeln!(out, "Log:")?;
    writeln!(out, "  Size:     {}", format_size(result.log_bytes))?;
    writeln!(out, "  Live:     {}", format_size(result.live_bytes))?;
    writeln!(out, "  Garbage:  {}", format_size(result.garbage_bytes))?;
    writeln!(out, "  Records:  {}", result.log_records)?;
    writeln!(out)?;
    writeln!(out, "Stores:")?;
    if result.stores.is_empty() {
        writeln!(out, "  (empty)")?;
    }
    for (name, count) in &result.stores {
        writeln!(out, "  {name}: {count} records")?;
    }
    writeln!(out)?;
    writeln!(out, "Sync queue:")?;
    writeln!(out, "  Pending:         {}", result.queue.pending)?;
    writeln!(out, "  In progress:     {}", result.queue.in_progress)?;
    writeln!(out, "  Retry scheduled: {}", result.queue.retry_scheduled)?;
    writeln!(out, "  Failed:          {}", result.queue.failed)?;
    writeln!(out)?;
    writeln!(out, "Conflicts:")?;
    writeln!(out, "  Active:   {}", result.active_conflicts)?;
    writeln!(out, "  Resolved: {}", result.resolved_conflicts)?;
    Ok(())
}
