//! Compact command implementation.

use super::{format_size, open_store, CliResult};
use std::io::Write;
use std::path::Path;

/// Runs the compact command. With `dry_run` only the garbage is reported.
pub fn run(path: &Path, dry_run: bool, out: &mut dyn Write) -> CliResult<()> {
    let store = open_store(path)?;
    let before = store.stats()?;

    writeln!(out, "Compacting store at {}", path.display())?;
    if dry_run {
        writeln!(out, "(dry run - no changes will be made)")?;
    }
    writeln!(out)?;
    writeln!(out, "  Log records:  {}", before.log_records)?;
    writeln!(out, "  Live records: {}", before.live_records)?;
    writeln!(out, "  Log size:     {}", format_size(before.log_bytes))?;
    writeln!(
        out,
        "  Garbage:      {} ({:.1}%)",
        format_size(before.garbage_bytes()),
        before.garbage_ratio() * 100.0
    )?;

    if dry_run {
        return Ok(());
    }
    if before.garbage_bytes() == 0 {
        writeln!(out)?;
        writeln!(out, "No compaction needed - log holds only live records")?;
        return Ok(());
    }

    let reclaimed = store.compact()?;
    store.sync()?;
    writeln!(out)?;
    writeln!(out, "✓ Compaction complete, reclaimed {}", format_size(reclaimed))?;
    Ok(())
}
