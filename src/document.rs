// The document/revision-log data model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::patch::Patch;

/// Attributes excluded when diffing payloads: transport metadata, merge
/// bookkeeping, or the revision log itself. Changes to these never
/// contribute to a replayed edit.
pub const IGNORE: &[&str] = &[
    "_attachments",
    "_revisions",
    "revisions",
    "dateModified",
    "_id",
    "_rev",
    "doc_type",
];

/// One entry in a document's append-only revision log. `changes` is the
/// patch that, applied to the state *after* this revision, reproduces the
/// state *before* it (i.e. a reverse patch). Absent on the genesis entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevisionEntry {
    pub rev: String,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Patch>,
}

/// A document variant: the opaque JSON body plus the reserved attributes
/// the core inspects.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub body: Value,
}

impl Document {
    pub fn new(body: Value) -> Self {
        Self { body }
    }

    pub fn id(&self) -> Option<&str> {
        self.body.get("_id").and_then(Value::as_str)
    }

    pub fn rev(&self) -> Option<&str> {
        self.body.get("_rev").and_then(Value::as_str)
    }

    /// The sibling revision identifiers reported alongside this winner.
    /// Absent on non-conflicting documents.
    pub fn conflicts(&self) -> Vec<String> {
        self.body
            .get("_conflicts")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// The ordered revision list, oldest first. `None` if the document has
    /// no `revisions` field at all, in which case the caller must skip
    /// resolution.
    pub fn revisions(&self) -> Option<Vec<RevisionEntry>> {
        let arr = self.body.get("revisions")?.as_array()?;
        let mut out = Vec::with_capacity(arr.len());
        for entry in arr {
            let rev = entry.get("rev").and_then(Value::as_str).unwrap_or_default().to_string();
            let date = entry.get("date").and_then(Value::as_str).unwrap_or_default().to_string();
            let changes = entry
                .get("changes")
                .filter(|v| !v.is_null())
                .and_then(|v| serde_json::from_value(v.clone()).ok());
            out.push(RevisionEntry { rev, date, changes });
        }
        Some(out)
    }

    /// Appends a new revision entry to `revisions`, creating the array if
    /// somehow absent (it never is once a document reaches the merger, but
    /// this keeps the type total).
    pub fn push_revision(&mut self, entry: RevisionEntry) {
        let revisions = self
            .body
            .as_object_mut()
            .expect("document body must be a JSON object")
            .entry("revisions")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(arr) = revisions {
            arr.push(serde_json::to_value(entry).expect("RevisionEntry always serializes"));
        }
    }

    pub fn set_date_modified(&mut self, date: &str) {
        if let Some(obj) = self.body.as_object_mut() {
            obj.insert("dateModified".to_string(), Value::String(date.to_string()));
        }
    }

    /// The list of `(rev, date)` pairs used by the ancestor locator.
    /// Equality is on the whole tuple, not `rev` alone.
    pub fn revision_positions(&self) -> Option<Vec<(String, String)>> {
        Some(
            self.revisions()?
                .into_iter()
                .map(|r| (r.rev, r.date))
                .collect(),
        )
    }
}

/// Removes the [`IGNORE`]d bookkeeping attributes from a document body,
/// returning a payload-only view suitable for diffing.
pub fn strip(value: &Value) -> Value {
    match value {
        Value::Object(obj) => {
            let mut out = Map::with_capacity(obj.len());
            for (k, v) in obj {
                if !IGNORE.contains(&k.as_str()) {
                    out.insert(k.clone(), v.clone());
                }
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strip_removes_ignored_attributes() {
        let doc = json!({
            "_id": "t1",
            "_rev": "1-a",
            "revisions": [],
            "dateModified": "2020",
            "title": "X",
        });
        assert_eq!(strip(&doc), json!({"title": "X"}));
    }

    #[test]
    fn revisions_missing_field_is_none() {
        let doc = Document::new(json!({"_id": "t1"}));
        assert!(doc.revisions().is_none());
    }

    #[test]
    fn revisions_missing_changes_is_no_op_step() {
        let doc = Document::new(json!({
            "revisions": [{"rev": "1-a", "date": "T0"}]
        }));
        let revs = doc.revisions().unwrap();
        assert_eq!(revs.len(), 1);
        assert!(revs[0].changes.is_none());
    }

    #[test]
    fn conflicts_defaults_to_empty() {
        let doc = Document::new(json!({"_id": "t1"}));
        assert!(doc.conflicts().is_empty());
    }

    #[test]
    fn push_revision_appends_to_log() {
        let mut doc = Document::new(json!({"revisions": []}));
        doc.push_revision(RevisionEntry {
            rev: "2-x".to_string(),
            date: "T1".to_string(),
            changes: None,
        });
        assert_eq!(doc.revisions().unwrap().len(), 1);
    }
}
