//! Queue listing.

use super::{open_store, CliResult, Format};
use sitesync_codec::to_json;
use sitesync_core::{PendingSyncItem, StoreRecord};
use sitesync_sync_engine::SyncOrchestrator;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Runs the queue command: lists queued items in replay order.
pub fn run(path: &Path, format: Format, out: &mut dyn Write) -> CliResult<()> {
    let orchestrator = SyncOrchestrator::load(Arc::new(open_store(path)?))?;
    let queue = orchestrator.sync_queue();

    match format {
        Format::Json => {
            let items = queue
                .iter()
                .map(|item| to_json(&item.to_value()))
                .collect::<Result<Vec<_>, _>>()?;
            writeln!(out, "{}", serde_json::to_string_pretty(&items)?)?;
        }
        Format::Text => {
            if queue.is_empty() {
                writeln!(out, "Sync queue is empty")?;
            }
            for item in &queue {
                writeln!(out, "{}", describe(item))?;
            }
        }
    }
    Ok(())
}

fn describe(item: &PendingSyncItem) -> String {
    let mut line = format!(
        "{}  {:<6} {}  {}  ts={}",
        item.id,
        item.operation.as_str(),
        item.entity_key(),
        item.status,
        item.timestamp
    );
    if item.retry_count > 0 {
        line.push_str(&format!("  retries={}", item.retry_count));
    }
    if let Some(at) = item.next_attempt_at {
        line.push_str(&format!("  next={at}"));
    }
    if item.force {
        line.push_str("  force");
    }
    if let Some(error) = &item.last_error {
        line.push_str(&format!("  error=\"{error}\""));
    }
    line
}
