// JSONL file operations, append-only log primitives shared by the store
// adapters and the sequence checkpoint. Operates on arbitrary JSON
// values, since documents here carry `_id`/`_rev` fields.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use eyre::{Context, Result};
use fs2::FileExt;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Appends one JSON value as a line to `path`, creating the file if
/// necessary. Takes an exclusive file lock for the duration of the write
/// so concurrent appenders (e.g. a save and a tombstone landing at once)
/// never interleave partial lines.
pub fn append<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context("failed to open JSONL file for appending")?;

    file.lock_exclusive().context("failed to acquire file lock")?;

    let json = serde_json::to_string(record)?;
    writeln!(file, "{json}")?;
    file.sync_all()?;

    Ok(())
}

/// Reads every well-formed JSON line from `path` in file order. Malformed
/// lines are logged and skipped; a single corrupted line must not take
/// down the whole store.
pub fn read_all(path: &Path) -> Result<Vec<Value>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path).context("failed to open JSONL file")?;
    file.lock_shared().context("failed to acquire shared file lock")?;

    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(file = ?path, line = line_num + 1, error = ?e, "failed to read line, skipping");
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str(&line) {
            Ok(value) => records.push(value),
            Err(e) => {
                warn!(file = ?path, line = line_num + 1, error = ?e, "failed to parse JSON, skipping");
            }
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn append_then_read_all_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tenders.jsonl");

        append(&path, &json!({"_id": "t1", "_rev": "1-a"})).unwrap();
        append(&path, &json!({"_id": "t1", "_rev": "2-b"})).unwrap();

        let records = read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn read_all_on_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.jsonl");
        assert!(read_all(&path).unwrap().is_empty());
    }

    #[test]
    fn read_all_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tenders.jsonl");
        std::fs::write(&path, "{\"_id\":\"t1\"}\n{not json}\n{\"_id\":\"t2\"}\n").unwrap();

        let records = read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
    }
}
