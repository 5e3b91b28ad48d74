//! Clear-queue command implementation.

use super::{open_store, CliError, CliResult};
use sitesync_sync_engine::SyncOrchestrator;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Runs the clear-queue command. Every queued mutation is abandoned;
/// conflicts are left alone.
pub fn run(path: &Path, confirmed: bool, out: &mut dyn Write) -> CliResult<()> {
    if !confirmed {
        return Err(CliError::NotConfirmed("clear the sync queue"));
    }
    let orchestrator = SyncOrchestrator::load(Arc::new(open_store(path)?))?;
    let dropped = orchestrator.clear_sync_queue()?;
    if dropped > 0 {
        warn!(dropped, "abandoned queued mutations");
    }
    writeln!(out, "Dropped {dropped} queued item(s)")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{output, store_file};
    use sitesync_core::{CONFLICTS_STORE, SYNC_QUEUE_STORE};
    use sitesync_testkit::scenarios;

    #[test]
    fn requires_confirmation() {
        let (_dir, path) = store_file(|store| {
            store.put_record(&scenarios::queue_items(1)[0]).unwrap();
        });
        let err = run(&path, false, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, CliError::NotConfirmed(_)));
        assert_eq!(open_store(&path).unwrap().len(SYNC_QUEUE_STORE), 1);
    }

    #[test]
    fn clears_queue_but_keeps_conflicts() {
        let (_dir, path) = store_file(|store| {
            for item in scenarios::queue_items(4) {
                store.put_record(&item).unwrap();
            }
            store.put_record(&scenarios::open_conflict()).unwrap();
        });
        let text = output(|out| run(&path, true, out).unwrap());
        assert!(text.contains("Dropped 4"));

        let store = open_store(&path).unwrap();
        assert!(store.is_empty(SYNC_QUEUE_STORE));
        assert_eq!(store.len(CONFLICTS_STORE), 1);
    }
}
