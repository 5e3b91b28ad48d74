//! Verify command implementation.

use super::{CliError, CliResult};
use sitesync_codec::from_cbor;
use sitesync_core::log::{LogReader, LogRecord};
use sitesync_storage::FileBackend;
use std::io::Write;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Complete records read.
    pub records_checked: u64,
    /// `Put` records.
    pub puts: u64,
    /// `Delete` records.
    pub deletes: u64,
    /// `Clear` records.
    pub clears: u64,
    /// Bytes after the last complete record.
    pub torn_bytes: u64,
    /// Problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Scans the log file without opening the store, so nothing is repaired.
pub fn scan(path: &Path) -> CliResult<VerifyResult> {
    if !path.exists() {
        return Err(CliError::NotFound(path.to_path_buf()));
    }
    let backend = FileBackend::open(path)?;
    let mut reader = LogReader::new(&backend)?;
    let mut result = VerifyResult::default();

    for entry in reader.by_ref() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                result.errors.push(e.to_string());
                break;
            }
        };
        result.records_checked += 1;
        match &entry.record {
            LogRecord::Put { store, id, value } => {
                result.puts += 1;
                if let Err(e) = from_cbor(value) {
                    result.errors.push(format!(
                        "offset {}: {store}/{id} holds an undecodable value: {e}",
                        entry.offset
                    ));
                }
            }
            LogRecord::Delete { .. } => result.deletes += 1,
            LogRecord::Clear { .. } => result.clears += 1,
        }
    }
    result.torn_bytes = reader.torn_bytes();
    Ok(result)
}

/// Runs the verify command.
pub fn run(path: &Path, out: &mut dyn Write) -> CliResult<()> {
    writeln!(out, "Verifying store at {}", path.display())?;
    writeln!(out)?;
    let result = scan(path)?;

    writeln!(out, "  Records checked: {}", result.records_checked)?;
    writeln!(
        out,
        "  Puts: {}  Deletes: {}  Clears: {}",
        result.puts, result.deletes, result.clears
    )?;
    if result.torn_bytes > 0 {
        writeln!(
            out,
            "  Torn tail: {} bytes (dropped the next time the store opens)",
            result.torn_bytes
        )?;
    }
    for error in &result.errors {
        writeln!(out, "  ERROR: {error}")?;
    }
    writeln!(out)?;

    if result.is_ok() {
        writeln!(out, "✓ Store verification passed")?;
        Ok(())
    } else {
        writeln!(out, "✗ Store verification failed")?;
        Err(CliError::VerificationFailed(format!(
            "{} problem(s) found",
            result.errors.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{output, store_file};
    use sitesync_codec::Value;
    use std::fs::OpenOptions;

    #[test]
    fn clean_store_passes() {
        let (_dir, path) = store_file(|store| {
            store.put("sync_queue", "a", &Value::from(1)).unwrap();
            store.put("sync_queue", "b", &Value::from(2)).unwrap();
            store.delete("sync_queue", "a").unwrap();
        });
        let result = scan(&path).unwrap();
        assert_eq!(result.records_checked, 3);
        assert_eq!(result.puts, 2);
        assert_eq!(result.deletes, 1);
        assert!(result.is_ok());

        let text = output(|out| run(&path, out).unwrap());
        assert!(text.contains("passed"));
    }

    #[test]
    fn torn_tail_is_reported_but_not_fatal() {
        let (_dir, path) = store_file(|store| {
            store.put("conflicts", "c", &Value::from("x")).unwrap();
        });
        let file = OpenOptions::new().append(true).open(&path).unwrap();
        let len = file.metadata().unwrap().len();
        file.set_len(len - 2).unwrap();

        let result = scan(&path).unwrap();
        assert_eq!(result.records_checked, 0);
        assert!(result.torn_bytes > 0);
        assert!(result.is_ok());
    }

    #[test]
    fn flipped_byte_fails() {
        let (_dir, path) = store_file(|store| {
            store.put("sync_queue", "a", &Value::from("payload")).unwrap();
            store.put("sync_queue", "b", &Value::from("payload")).unwrap();
        });
        let mut bytes = std::fs::read(&path).unwrap();
        let middle = bytes.len() / 4;
        bytes[middle] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let result = scan(&path).unwrap();
        assert!(!result.is_ok());
        let err = run(&path, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, CliError::VerificationFailed(_)));
    }
}
