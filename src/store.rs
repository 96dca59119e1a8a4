// The database client contract, an external collaborator, not part of
// the core algorithm. `ConflictStore` is the trait boundary;
// `InMemoryStore` and `JsonlConflictStore` are adapters good enough to
// run the daemon end to end without a real multi-master database binding.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

use crate::document::Document;
use crate::jsonl;

/// Errors from a store read or a bulk tombstone call.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("document not found: {0}@{1}")]
    NotFound(String, String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors from a save call. A `Conflict` (the winner was superseded) is
/// silently retried by re-observation through the change feed; a
/// `Transport` failure is logged and retried the same way.
#[derive(Debug, Error, Clone)]
pub enum SaveError {
    #[error("store conflict: revision superseded")]
    Conflict,
    #[error("transport error: {0}")]
    Transport(String),
}

/// The outcome of tombstoning one sibling revision.
#[derive(Debug, Clone)]
pub struct TombstoneResult {
    pub id: String,
    pub rev: String,
    pub deleted: bool,
    pub error: Option<String>,
}

/// The database client contract the daemon consumes.
pub trait ConflictStore {
    /// Fetches a specific historical revision body.
    fn get(&self, id: &str, rev: &str) -> Result<Document, StoreError>;

    /// Atomically creates a new revision, returning `(id, new_rev)`.
    fn save(&self, doc: Document) -> Result<(String, String), SaveError>;

    /// Tombstones a batch of `(id, rev)` pairs. Individual failures are
    /// reported per-target, not as a whole-call error.
    fn bulk_delete(&self, targets: &[(String, String)]) -> Result<Vec<TombstoneResult>, StoreError>;
}

fn bump_rev(rev: &str, counter: &AtomicU64) -> String {
    let generation: u64 = rev.split('-').next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let suffix = counter.fetch_add(1, Ordering::Relaxed);
    format!("{}-{:08x}", generation + 1, suffix)
}

/// An in-process store keyed by `(id, rev)`, with a per-`id` pointer to the
/// currently winning revision used to detect store conflicts on save.
/// Backed by an in-process mutex since there is no file to contend over.
pub struct InMemoryStore {
    revisions: Mutex<HashMap<(String, String), Value>>,
    current: Mutex<HashMap<String, String>>,
    counter: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            revisions: Mutex::new(HashMap::new()),
            current: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Seeds a revision directly, bypassing conflict checks; used to set
    /// up sibling fixtures in tests.
    pub fn seed(&self, id: &str, rev: &str, body: Value) {
        self.revisions
            .lock()
            .insert((id.to_string(), rev.to_string()), body);
        self.current.lock().entry(id.to_string()).or_insert_with(|| rev.to_string());
    }

    /// Marks `rev` as the current winning revision for `id`.
    pub fn set_current(&self, id: &str, rev: &str) {
        self.current.lock().insert(id.to_string(), rev.to_string());
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictStore for InMemoryStore {
    fn get(&self, id: &str, rev: &str) -> Result<Document, StoreError> {
        self.revisions
            .lock()
            .get(&(id.to_string(), rev.to_string()))
            .cloned()
            .map(Document::new)
            .ok_or_else(|| StoreError::NotFound(id.to_string(), rev.to_string()))
    }

    fn save(&self, doc: Document) -> Result<(String, String), SaveError> {
        let id = doc
            .id()
            .ok_or_else(|| SaveError::Transport("document missing _id".to_string()))?
            .to_string();
        let base_rev = doc
            .rev()
            .ok_or_else(|| SaveError::Transport("document missing _rev".to_string()))?
            .to_string();

        let mut current = self.current.lock();
        if let Some(existing) = current.get(&id) {
            if existing != &base_rev {
                return Err(SaveError::Conflict);
            }
        }

        let new_rev = bump_rev(&base_rev, &self.counter);
        let mut body = doc.body.clone();
        if let Some(obj) = body.as_object_mut() {
            obj.insert("_rev".to_string(), Value::String(new_rev.clone()));
        }

        self.revisions.lock().insert((id.clone(), new_rev.clone()), body);
        current.insert(id.clone(), new_rev.clone());

        Ok((id, new_rev))
    }

    fn bulk_delete(&self, targets: &[(String, String)]) -> Result<Vec<TombstoneResult>, StoreError> {
        let mut results = Vec::with_capacity(targets.len());
        for (id, rev) in targets {
            let removed = self.revisions.lock().remove(&(id.clone(), rev.clone())).is_some();
            results.push(TombstoneResult {
                id: id.clone(),
                rev: rev.clone(),
                deleted: removed,
                error: if removed { None } else { Some("not found".to_string()) },
            });
        }
        Ok(results)
    }
}

/// A durable store backed by one append-only JSONL file per collection,
/// with document bodies keyed by `(_id, _rev)`.
pub struct JsonlConflictStore {
    path: PathBuf,
    counter: AtomicU64,
}

impl JsonlConflictStore {
    pub fn new(collection_file: impl Into<PathBuf>) -> Self {
        Self {
            path: collection_file.into(),
            counter: AtomicU64::new(0),
        }
    }

    fn read_all(&self) -> Result<Vec<Value>, StoreError> {
        jsonl::read_all(&self.path).map_err(|e| StoreError::Transport(e.to_string()))
    }

    fn latest_rev(&self, id: &str) -> Result<Option<String>, StoreError> {
        let entries = self.read_all()?;
        let mut best: Option<String> = None;
        for entry in entries {
            if entry.get("_id").and_then(Value::as_str) != Some(id) {
                continue;
            }
            if entry.get("_deleted").and_then(Value::as_bool) == Some(true) {
                continue;
            }
            if let Some(rev) = entry.get("_rev").and_then(Value::as_str) {
                best = Some(rev.to_string());
            }
        }
        Ok(best)
    }
}

impl ConflictStore for JsonlConflictStore {
    fn get(&self, id: &str, rev: &str) -> Result<Document, StoreError> {
        let entries = self.read_all()?;
        entries
            .into_iter()
            .find(|e| e.get("_id").and_then(Value::as_str) == Some(id) && e.get("_rev").and_then(Value::as_str) == Some(rev))
            .map(Document::new)
            .ok_or_else(|| StoreError::NotFound(id.to_string(), rev.to_string()))
    }

    fn save(&self, doc: Document) -> Result<(String, String), SaveError> {
        let id = doc
            .id()
            .ok_or_else(|| SaveError::Transport("document missing _id".to_string()))?
            .to_string();
        let base_rev = doc
            .rev()
            .ok_or_else(|| SaveError::Transport("document missing _rev".to_string()))?
            .to_string();

        let latest = self
            .latest_rev(&id)
            .map_err(|e| SaveError::Transport(e.to_string()))?;
        if let Some(latest) = latest {
            if latest != base_rev {
                return Err(SaveError::Conflict);
            }
        }

        let new_rev = bump_rev(&base_rev, &self.counter);
        let mut body = doc.body.clone();
        if let Some(obj) = body.as_object_mut() {
            obj.insert("_rev".to_string(), Value::String(new_rev.clone()));
        }

        jsonl::append(&self.path, &body).map_err(|e| SaveError::Transport(e.to_string()))?;
        Ok((id, new_rev))
    }

    fn bulk_delete(&self, targets: &[(String, String)]) -> Result<Vec<TombstoneResult>, StoreError> {
        let mut results = Vec::with_capacity(targets.len());
        for (id, rev) in targets {
            let tombstone = serde_json::json!({"_id": id, "_rev": rev, "_deleted": true});
            match jsonl::append(&self.path, &tombstone) {
                Ok(()) => results.push(TombstoneResult {
                    id: id.clone(),
                    rev: rev.clone(),
                    deleted: true,
                    error: None,
                }),
                Err(e) => results.push(TombstoneResult {
                    id: id.clone(),
                    rev: rev.clone(),
                    deleted: false,
                    error: Some(e.to_string()),
                }),
            }
        }
        Ok(results)
    }
}

pub fn collection_path(base_dir: &Path, collection: &str) -> PathBuf {
    base_dir.join(format!("{collection}.jsonl"))
}
