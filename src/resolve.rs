// Resolution orchestrator: a pure function from a winner plus its sibling
// bodies to a merged winner or a documented skip reason. No database or
// log calls happen here; those belong to the daemon loop
// (`src/changefeed.rs`) and the store adapters (`src/store.rs`).

use std::collections::BTreeSet;

use crate::ancestor;
use crate::document::Document;
use crate::error::PatchError;
use crate::merge::{self, SiblingEdits};
use crate::reconstruct;

/// Why a document's conflict was not resolved. `CannotApply` carries the
/// underlying [`PatchError`] so the event log can distinguish a
/// dangling-pointer failure from a structural patch conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoHistory,
    NoCommonRevision,
    CannotRestore,
    CannotApply(PatchError),
}

/// The outcome of [`resolve`].
pub enum Resolution {
    /// At least one sibling edit was merged into the winner.
    Resolved { winner: Document },
    /// The winner already reflected every sibling edit; nothing changed.
    ResolvedWithoutChanges,
    /// Resolution could not proceed; see [`SkipReason`].
    Skipped(SkipReason),
}

/// One sibling document variant, keyed by its revision identifier as it
/// appeared in the winner's `_conflicts` list (this ordering is the
/// tie-break the merger uses).
pub struct Sibling {
    pub rev: String,
    pub document: Document,
}

/// Runs the conflict-resolution algorithm: locates the common ancestor
/// across the winner and all siblings, reconstructs each sibling's forward
/// edits since that point, and replays the non-duplicate ones into the
/// winner in timestamp order.
pub fn resolve(winner: Document, siblings: Vec<Sibling>) -> Resolution {
    let Some(winner_positions) = winner.revision_positions() else {
        return Resolution::Skipped(SkipReason::NoHistory);
    };

    let mut sibling_positions = Vec::with_capacity(siblings.len());
    for sibling in &siblings {
        let Some(positions) = sibling.document.revision_positions() else {
            return Resolution::Skipped(SkipReason::NoHistory);
        };
        sibling_positions.push(positions);
    }

    let Some(ancestor) = ancestor::locate(&winner_positions, &sibling_positions) else {
        return Resolution::Skipped(SkipReason::NoCommonRevision);
    };

    let winner_revisions = winner.revisions().expect("checked above");
    let applied: BTreeSet<String> = winner_revisions[ancestor.index..]
        .iter()
        .map(|r| r.date.clone())
        .collect();

    let mut sibling_edits = Vec::with_capacity(siblings.len());
    for (order, sibling) in siblings.iter().enumerate() {
        let sibling_revisions = sibling.document.revisions().expect("checked above");
        let edits = match reconstruct::reconstruct(&sibling.document.body, &sibling_revisions, ancestor.index) {
            Ok(edits) => edits,
            Err(_) => return Resolution::Skipped(SkipReason::CannotRestore),
        };
        sibling_edits.push(SiblingEdits { order, edits });
    }

    match merge::merge(winner, &ancestor.rev, applied, sibling_edits) {
        Ok(outcome) if outcome.changed => Resolution::Resolved {
            winner: outcome.winner,
        },
        Ok(_) => Resolution::ResolvedWithoutChanges,
        Err(e) => Resolution::Skipped(SkipReason::CannotApply(e)),
    }
}
