// Merger: replays each sibling's forward edits into the winner in
// timestamp order, skipping edits already reflected via the idempotency
// anchor (the winner's own post-ancestor applied-timestamp set).

use std::collections::BTreeSet;

use crate::document::{strip, Document, RevisionEntry};
use crate::error::PatchError;
use crate::patch::{apply_cloned, diff};
use crate::reconstruct::ForwardEdit;

/// One sibling's reconstructed edits, tagged with its iteration order
/// (the order its `rev` appeared in `_conflicts`) for tie-breaking.
pub struct SiblingEdits {
    pub order: usize,
    pub edits: Vec<ForwardEdit>,
}

/// The outcome of merging all siblings into the winner.
pub struct MergeOutcome {
    pub winner: Document,
    pub changed: bool,
}

/// Applies every sibling's chronologically-ordered forward edits to
/// `winner`, skipping dates already in `applied`. Ties across siblings
/// at the same date are broken by `order` (ascending), matching the
/// order sibling revisions appeared in `_conflicts`.
///
/// # Errors
/// Returns [`PatchError`] (reported by the caller as `CannotApply`) if a
/// forward edit cannot be applied to the current winner state.
pub fn merge(
    mut winner: Document,
    ancestor_rev: &str,
    mut applied: BTreeSet<String>,
    siblings: Vec<SiblingEdits>,
) -> Result<MergeOutcome, PatchError> {
    let mut timeline: Vec<(String, usize, RevisionEntry, crate::patch::Patch)> = Vec::new();
    for sibling in siblings {
        // Reconstruct emits newest-first; the merger wants oldest-edit-first.
        for edit in sibling.edits.into_iter().rev() {
            timeline.push((edit.date, sibling.order, edit.source_revision, edit.patch));
        }
    }
    timeline.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut changed = false;
    for (date, _order, source_revision, forward_patch) in timeline {
        if applied.contains(&date) {
            continue;
        }

        let before = winner.body.clone();
        let after = apply_cloned(&before, &forward_patch)?;

        let effective = diff(&strip(&after), &strip(&before));
        winner.body = after;

        if !effective.is_empty() {
            winner.push_revision(RevisionEntry {
                rev: ancestor_rev.to_string(),
                date: source_revision.date.clone(),
                changes: Some(effective),
            });
            changed = true;
        }
        applied.insert(date);
    }

    Ok(MergeOutcome { winner, changed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::PatchOp;
    use serde_json::{json, Value};

    fn edit(date: &str, patch: crate::patch::Patch) -> ForwardEdit {
        ForwardEdit {
            date: date.to_string(),
            source_revision: RevisionEntry {
                rev: "sib".to_string(),
                date: date.to_string(),
                changes: None,
            },
            patch,
        }
    }

    #[test]
    fn applies_non_applied_edit_and_appends_provenance_revision() {
        let edits = vec![edit(
            "T3",
            vec![PatchOp::Remove {
                path: "/note".to_string(),
            }],
        )];
        let winner = Document::new(json!({"revisions": [], "title": "X", "note": "N"}));
        let outcome = merge(
            winner,
            "2-x",
            BTreeSet::new(),
            vec![SiblingEdits { order: 0, edits }],
        )
        .unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.winner.body["note"], Value::Null);
        let revs = outcome.winner.revisions().unwrap();
        assert_eq!(revs.len(), 1);
        assert_eq!(revs[0].rev, "2-x");
        assert_eq!(revs[0].date, "T3");
    }

    #[test]
    fn skips_edit_already_in_applied_set() {
        let winner = Document::new(json!({"revisions": [], "note": "N"}));
        let edits = vec![edit(
            "T1",
            vec![PatchOp::Remove {
                path: "/note".to_string(),
            }],
        )];
        let mut applied = BTreeSet::new();
        applied.insert("T1".to_string());
        let outcome = merge(winner, "2-x", applied, vec![SiblingEdits { order: 0, edits }]).unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.winner.body["note"], json!("N"));
        assert!(outcome.winner.revisions().unwrap().is_empty());
    }

    #[test]
    fn ties_broken_by_sibling_iteration_order() {
        let winner = Document::new(json!({"revisions": [], "a": 1}));
        let a = vec![edit(
            "T1",
            vec![PatchOp::Replace {
                path: "/a".to_string(),
                value: json!(2),
            }],
        )];
        let b = vec![edit(
            "T1",
            vec![PatchOp::Replace {
                path: "/a".to_string(),
                value: json!(3),
            }],
        )];
        let outcome = merge(
            winner,
            "1-x",
            BTreeSet::new(),
            vec![
                SiblingEdits { order: 0, edits: a },
                SiblingEdits { order: 1, edits: b },
            ],
        )
        .unwrap();
        // order 1 (sibling b) applied last at same timestamp, so it wins.
        assert_eq!(outcome.winner.body["a"], json!(3));
    }
}
