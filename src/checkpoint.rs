// Sequence checkpoint persistence: bootstrap/checkpoint of the last
// processed change-feed sequence. An external collaborator, but a
// runnable daemon needs one.

use std::fs;
use std::path::Path;

use eyre::{Context, Result};
use fs2::FileExt;

/// Loads the last processed sequence number, or `0` if the file is absent
/// or unparsable (a fresh start).
pub fn load(path: &Path) -> Result<u64> {
    if !path.exists() {
        return Ok(0);
    }
    let contents = fs::read_to_string(path).context("failed to read checkpoint file")?;
    Ok(contents.trim().parse().unwrap_or(0))
}

/// Persists `seq` to `path`, taking an exclusive lock so a concurrent
/// reader never observes a torn write.
pub fn save(path: &Path, seq: u64) -> Result<()> {
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .context("failed to open checkpoint file")?;
    file.lock_exclusive().context("failed to acquire checkpoint lock")?;
    fs::write(path, seq.to_string()).context("failed to write checkpoint file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_missing_file_is_zero() {
        let dir = TempDir::new().unwrap();
        assert_eq!(load(&dir.path().join("seq")).unwrap(), 0);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seq");
        save(&path, 42).unwrap();
        assert_eq!(load(&path).unwrap(), 42);
    }
}
