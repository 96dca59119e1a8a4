// Reconstructor: rebuilds a sibling's forward edits since the common
// ancestor by walking its stored reverse patches backward and re-deriving
// a forward diff at each step.

use serde_json::Value;

use crate::document::{strip, RevisionEntry};
use crate::error::PatchError;
use crate::patch::{apply_cloned, diff, Patch};

/// One forward change set contributed by a sibling at one revision step,
/// annotated with the originating revision's timestamp and entry.
#[derive(Debug, Clone)]
pub struct ForwardEdit {
    pub date: String,
    pub source_revision: RevisionEntry,
    pub patch: Patch,
}

/// Walks `revisions[ancestor_index..]` in reverse from `current_state`,
/// applying each entry's stored reverse patch to recover the prior state
/// and diffing the ignored-attribute-stripped before/after to produce a
/// forward edit. Entries with no `changes` contribute no edit but still
/// occupy a position in the ordering.
///
/// Returns edits in reverse-chronological order (newest first), matching
/// the order they were discovered; the merger consumes them reversed.
///
/// # Errors
/// Returns [`PatchError`] if a reverse application fails structurally, in
/// which case the caller reports this as `CannotRestore` and aborts the
/// whole document.
pub fn reconstruct(
    current_state: &Value,
    revisions: &[RevisionEntry],
    ancestor_index: usize,
) -> Result<Vec<ForwardEdit>, PatchError> {
    let mut edits = Vec::new();
    let mut state = current_state.clone();

    for entry in revisions[ancestor_index..].iter().rev() {
        let Some(changes) = &entry.changes else {
            continue;
        };
        let prev_state = apply_cloned(&state, changes)?;

        let before = strip(&prev_state);
        let after = strip(&state);
        let forward = diff(&before, &after);

        edits.push(ForwardEdit {
            date: entry.date.clone(),
            source_revision: entry.clone(),
            patch: forward,
        });

        state = prev_state;
    }

    Ok(edits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::PatchOp;
    use serde_json::json;

    #[test]
    fn reconstructs_single_forward_edit() {
        // Current state has note removed; the stored reverse patch adds it back.
        let current = json!({"_id": "t1", "title": "old"});
        let revisions = vec![
            RevisionEntry { rev: "1-x".to_string(), date: "T0".to_string(), changes: None },
            RevisionEntry {
                rev: "2-y".to_string(),
                date: "T1".to_string(),
                changes: Some(vec![PatchOp::Add {
                    path: "/note".to_string(),
                    value: json!("N"),
                }]),
            },
        ];
        let edits = reconstruct(&current, &revisions, 1).unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].date, "T1");
        // Forward edit should remove /note (prev had note, after-strip doesn't).
        assert!(edits[0]
            .patch
            .iter()
            .any(|op| matches!(op, PatchOp::Remove { path } if path == "/note")));
    }

    #[test]
    fn skips_entries_without_changes() {
        let current = json!({"title": "X"});
        let revisions = vec![
            RevisionEntry { rev: "1-x".to_string(), date: "T0".to_string(), changes: None },
            RevisionEntry { rev: "2-x".to_string(), date: "T1".to_string(), changes: None },
        ];
        let edits = reconstruct(&current, &revisions, 0).unwrap();
        assert!(edits.is_empty());
    }

    #[test]
    fn restore_failure_is_patch_conflict() {
        let current = json!({"title": "X"});
        let revisions = vec![RevisionEntry {
            rev: "1-x".to_string(),
            date: "T0".to_string(),
            changes: Some(vec![PatchOp::Remove {
                path: "/missing".to_string(),
            }]),
        }];
        let err = reconstruct(&current, &revisions, 0).unwrap_err();
        assert!(matches!(err, PatchError::PathNotFound(_)));
    }
}
