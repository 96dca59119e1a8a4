// The change-feed consumer. Yields `{id, doc}` records shaped like the
// winner body with `_conflicts` set; no ordering or exactly-once delivery
// is required. This module also hosts the per-document handling that
// wires the pure `resolve` core to the `ConflictStore` and the structured
// event log.

use std::time::Duration;

use serde_json::Value;

use crate::config::Config;
use crate::document::Document;
use crate::error::PatchError;
use crate::events::{log_error, log_info, log_warn, MessageId};
use crate::resolve::{resolve, Resolution, Sibling, SkipReason};
use crate::store::{ConflictStore, SaveError};

/// One record from the change feed: a winner body carrying `_conflicts`.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub id: String,
    pub seq: u64,
    pub doc: Value,
}

/// A source of conflict records. `poll` may long-poll internally; an empty
/// result means "nothing new within the timeout", not "done forever";
/// the daemon loop keeps calling it.
pub trait ChangeFeed {
    fn poll(&mut self, timeout: Duration) -> Vec<ChangeRecord>;
}

/// An in-memory feed over a fixed batch, useful for tests and for
/// replaying a captured fixture via the `resolve-file` CLI command.
pub struct FixedChangeFeed {
    pending: Vec<ChangeRecord>,
}

impl FixedChangeFeed {
    pub fn new(records: Vec<ChangeRecord>) -> Self {
        Self { pending: records }
    }
}

impl ChangeFeed for FixedChangeFeed {
    fn poll(&mut self, _timeout: Duration) -> Vec<ChangeRecord> {
        std::mem::take(&mut self.pending)
    }
}

/// Maps a skip reason to its message identifier and log params. `CannotApply`
/// splits further by the underlying [`PatchError`] kind: a dangling pointer
/// gets `conflict_error_pointer`, a structural conflict (bad index, failed
/// `test`, ...) gets `conflict_error_patch`.
fn skip_reason_message(reason: &SkipReason) -> (MessageId, String) {
    match reason {
        SkipReason::NoHistory => (MessageId::ConflictErrorCommon, "no revisions field".to_string()),
        SkipReason::NoCommonRevision => (MessageId::ConflictErrorCommon, String::new()),
        SkipReason::CannotRestore => (MessageId::ConflictErrorRestore, String::new()),
        SkipReason::CannotApply(PatchError::PathNotFound(path)) => (MessageId::ConflictErrorPointer, path.clone()),
        SkipReason::CannotApply(PatchError::PatchConflict(path, reason)) => {
            (MessageId::ConflictErrorPatch, format!("{path}: {reason}"))
        }
        SkipReason::CannotApply(PatchError::MalformedPatch(detail)) => (MessageId::ConflictErrorPatch, detail.clone()),
    }
}

/// Writes `body` to `{dump_dir}/{id}@{suffix}.json`. Dumping is a
/// best-effort debug aid, not part of the resolution contract: a write
/// failure is logged and otherwise ignored.
fn dump(dump_dir: Option<&std::path::Path>, id: &str, suffix: &str, body: &Value) {
    let Some(dir) = dump_dir else { return };
    let path = dir.join(format!("{id}@{suffix}.json"));
    if let Err(e) = std::fs::write(&path, body.to_string()) {
        tracing::warn!(path = ?path, error = ?e, "failed to write conflict dump");
    }
}

/// Handles one conflicted document end to end: fetches sibling bodies,
/// runs the pure resolution core, and depending on its outcome saves the
/// merged winner and/or tombstones the siblings. Split so the algorithmic
/// core (`resolve`) stays free of I/O.
pub fn handle_conflict(store: &impl ConflictStore, config: &Config, id: &str, winner_body: Value) {
    let winner = Document::new(winner_body);
    let winner_rev = winner.rev().unwrap_or_default().to_string();
    let conflicts = winner.conflicts();

    log_info(id, &winner_rev, MessageId::ConflictDetected, &conflicts.join(","));
    dump(
        config.dump_dir.as_deref(),
        id,
        &format!("{winner_rev}_conflicts"),
        &winner.body,
    );

    if winner.revisions().is_none() {
        log_error(id, &winner_rev, MessageId::ConflictErrorCommon, "no revisions field");
        return;
    }

    let mut siblings = Vec::with_capacity(conflicts.len());
    for rev in &conflicts {
        match store.get(id, rev) {
            Ok(document) => {
                dump(config.dump_dir.as_deref(), id, rev, &document.body);
                siblings.push(Sibling {
                    rev: rev.clone(),
                    document,
                });
            }
            Err(_) => {
                log_error(id, rev, MessageId::ConflictErrorGet, rev);
                return;
            }
        }
    }

    let outcome = resolve(winner, siblings);

    let merged = match outcome {
        Resolution::Skipped(reason) => {
            let (message_id, params) = skip_reason_message(&reason);
            log_error(id, &winner_rev, message_id, &params);
            return;
        }
        Resolution::ResolvedWithoutChanges => {
            log_info(id, &winner_rev, MessageId::ConflictResolvedWoChanges, "");
            None
        }
        Resolution::Resolved { mut winner } => {
            winner.set_date_modified(&config.now_in_zone());
            Some(winner)
        }
    };

    if let Some(merged) = merged {
        match store.save(merged) {
            Ok((_, new_rev)) => {
                log_info(id, &new_rev, MessageId::ConflictResolved, "");
            }
            Err(SaveError::Conflict) => {
                log_info(id, &winner_rev, MessageId::ConflictNotResolved, "");
                return;
            }
            Err(SaveError::Transport(msg)) => {
                log_error(id, &winner_rev, MessageId::ConflictErrorSave, &msg);
                return;
            }
        }
    }

    let targets: Vec<(String, String)> = conflicts.iter().map(|r| (id.to_string(), r.clone())).collect();
    match store.bulk_delete(&targets) {
        Ok(results) => {
            let revs = results.iter().map(|r| r.rev.as_str()).collect::<Vec<_>>().join(",");
            log_info(id, &winner_rev, MessageId::ConflictDeleting, &revs);
            for r in results.iter().filter(|r| !r.deleted) {
                log_warn(id, &r.rev, MessageId::ConflictErrorDeleting, r.error.as_deref().unwrap_or(""));
            }
        }
        Err(e) => {
            log_error(id, &winner_rev, MessageId::ConflictErrorDeleting, &e.to_string());
        }
    }
}

/// Processes one batch of change records sequentially. The core imposes
/// no ordering between documents; this loop's sequentiality is a
/// reference choice, not a requirement; a caller free to dispatch
/// documents concurrently may do so as long as each document's own
/// handling stays single-threaded.
pub fn process_batch(store: &impl ConflictStore, config: &Config, records: &[ChangeRecord]) {
    for record in records {
        handle_conflict(store, config, &record.id, record.doc.clone());
    }
}

/// Drains `feed` until it reports no further records, processing each
/// batch and persisting the last-seen sequence. Suitable for one-shot or
/// test-bounded runs; `run_daemon_forever` below is the long-lived form.
pub fn run_until_idle(feed: &mut impl ChangeFeed, store: &impl ConflictStore, config: &Config) {
    loop {
        let batch = feed.poll(config.poll_timeout());
        if batch.is_empty() {
            break;
        }
        process_batch(store, config, &batch);
        if let Some(last) = batch.last() {
            if let Some(checkpoint_path) = &config.seq_file {
                let _ = crate::checkpoint::save(checkpoint_path, last.seq);
            }
        }
    }
}

/// The long-running daemon loop: repeatedly polls the feed and processes
/// whatever comes back, forever.
pub fn run_daemon_forever(feed: &mut impl ChangeFeed, store: &impl ConflictStore, config: &Config) -> ! {
    loop {
        let batch = feed.poll(config.poll_timeout());
        process_batch(store, config, &batch);
        if let (Some(last), Some(checkpoint_path)) = (batch.last(), &config.seq_file) {
            let _ = crate::checkpoint::save(checkpoint_path, last.seq);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn test_config() -> Config {
        Config::default()
    }

    #[test]
    fn skip_reason_message_splits_pointer_from_patch_conflict() {
        let (pointer_id, _) = skip_reason_message(&SkipReason::CannotApply(PatchError::PathNotFound("/note".to_string())));
        assert_eq!(pointer_id, MessageId::ConflictErrorPointer);

        let (patch_id, _) = skip_reason_message(&SkipReason::CannotApply(PatchError::PatchConflict(
            "/items/9".to_string(),
            "array index out of range".to_string(),
        )));
        assert_eq!(patch_id, MessageId::ConflictErrorPatch);
    }

    #[test]
    fn handle_conflict_dumps_winner_and_siblings_when_configured() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = test_config();
        config.dump_dir = Some(dir.path().to_path_buf());

        let store = InMemoryStore::new();
        store.seed(
            "t1",
            "3-b",
            json!({
                "_id": "t1",
                "_rev": "3-b",
                "revisions": [{"rev": "1-x", "date": "T0"}],
            }),
        );
        store.set_current("t1", "3-a");

        let winner = json!({
            "_id": "t1",
            "_rev": "3-a",
            "_conflicts": ["3-b"],
            "revisions": [{"rev": "1-a", "date": "T0"}],
        });
        handle_conflict(&store, &config, "t1", winner);

        assert!(dir.path().join("t1@3-a_conflicts.json").exists());
        assert!(dir.path().join("t1@3-b.json").exists());
    }

    #[test]
    fn handle_conflict_merges_and_tombstones() {
        let store = InMemoryStore::new();
        store.seed(
            "t1",
            "3-b",
            json!({
                "_id": "t1",
                "_rev": "3-b",
                "title": "old",
                "note": "N",
                "revisions": [
                    {"rev": "1-x", "date": "T0"},
                    {"rev": "2-x", "date": "T1"},
                    {"rev": "3-y", "date": "T3", "changes": [{"op": "remove", "path": "/note"}]},
                ],
            }),
        );
        store.set_current("t1", "3-a");

        let winner = json!({
            "_id": "t1",
            "_rev": "3-a",
            "_conflicts": ["3-b"],
            "title": "X",
            "revisions": [
                {"rev": "1-x", "date": "T0"},
                {"rev": "2-x", "date": "T1"},
                {"rev": "3-x", "date": "T2", "changes": [{"op": "replace", "path": "/title", "value": "old"}]},
            ],
        });

        handle_conflict(&store, &test_config(), "t1", winner);

        // Sibling revision should be gone after tombstoning.
        assert!(store.get("t1", "3-b").is_err());
    }

    #[test]
    fn handle_conflict_with_no_conflicts_list_is_a_noop_tombstone_pass() {
        let store = InMemoryStore::new();
        store.set_current("t1", "1-a");
        let winner = json!({
            "_id": "t1",
            "_rev": "1-a",
            "revisions": [{"rev": "1-a", "date": "T0"}],
        });
        handle_conflict(&store, &test_config(), "t1", winner);
    }

    #[test]
    fn run_until_idle_drains_a_fixed_feed() {
        let store = InMemoryStore::new();
        store.set_current("t1", "1-a");
        let mut feed = FixedChangeFeed::new(vec![ChangeRecord {
            id: "t1".to_string(),
            seq: 1,
            doc: json!({"_id": "t1", "_rev": "1-a", "revisions": [{"rev": "1-a", "date": "T0"}]}),
        }]);
        run_until_idle(&mut feed, &store, &test_config());
        assert!(feed.poll(Duration::from_millis(0)).is_empty());
    }
}
