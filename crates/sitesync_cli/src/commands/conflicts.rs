//! Conflict listing.

use super::{open_store, CliResult, Format};
use sitesync_codec::to_json;
use sitesync_core::{ConflictRecord, StoreRecord};
use std::io::Write;
use std::path::Path;

/// Runs the conflicts command: lists active conflicts, or every stored one
/// with `all`, oldest first.
pub fn run(path: &Path, all: bool, format: Format, out: &mut dyn Write) -> CliResult<()> {
    let store = open_store(path)?;
    let mut conflicts: Vec<ConflictRecord> = store.all_records()?;
    if !all {
        conflicts.retain(ConflictRecord::is_active);
    }
    conflicts.sort_by(|a, b| a.detected_at.cmp(&b.detected_at).then_with(|| a.id.cmp(&b.id)));

    match format {
        Format::Json => {
            let records = conflicts
                .iter()
                .map(|c| to_json(&c.to_value()))
                .collect::<Result<Vec<_>, _>>()?;
            writeln!(out, "{}", serde_json::to_string_pretty(&records)?)?;
        }
        Format::Text => {
            if conflicts.is_empty() {
                writeln!(out, "No conflicts")?;
            }
            for conflict in &conflicts {
                print_conflict(conflict, out)?;
            }
        }
    }
    Ok(())
}

fn print_conflict(conflict: &ConflictRecord, out: &mut dyn Write) -> CliResult<()> {
    let state = match conflict.resolution {
        Some(kind) => format!("resolved ({kind})"),
        None => "open".to_owned(),
    };
    writeln!(
        out,
        "{}  {}/{}  {}  detected={}",
        conflict.id, conflict.entity_type, conflict.entity_id, state, conflict.detected_at
    )?;
    if let Some(item) = &conflict.item_id {
        writeln!(out, "  raised by item {item}")?;
    }
    for field in &conflict.field_conflicts {
        let name = if field.field.is_empty() {
            "(value)"
        } else {
            field.field.as_str()
        };
        writeln!(
            out,
            "  {name}: local={} server={}",
            to_json(&field.local)?,
            to_json(&field.server)?
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{output, store_file};
    use sitesync_core::ResolutionKind;
    use sitesync_testkit::scenarios;

    fn two_conflicts() -> (tempfile::TempDir, std::path::PathBuf) {
        store_file(|store| {
            store
                .put_record(&scenarios::open_conflict().with_id("c-open"))
                .unwrap();
            let mut closed = scenarios::open_conflict().with_id("c-closed");
            closed.mark_resolved(ResolutionKind::Local, 5);
            store.put_record(&closed).unwrap();
        })
    }

    #[test]
    fn lists_active_by_default() {
        let (_dir, path) = two_conflicts();
        let text = output(|out| run(&path, false, Format::Text, out).unwrap());
        assert!(text.contains("c-open"));
        assert!(!text.contains("c-closed"));
        assert!(text.contains("status: local=\"done\" server=\"blocked\""));
    }

    #[test]
    fn all_includes_resolved() {
        let (_dir, path) = two_conflicts();
        let text = output(|out| run(&path, true, Format::Text, out).unwrap());
        assert!(text.contains("c-closed"));
        assert!(text.contains("resolved (local)"));
    }

    #[test]
    fn json_output() {
        let (_dir, path) = two_conflicts();
        let text = output(|out| run(&path, false, Format::Json, out).unwrap());
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["resolved"], false);
    }
}
