// Common-ancestor locator.

/// The result of locating the common ancestor across a winner and its
/// siblings: the length of the shared prefix, and the revision identifier
/// at its last position (the common-ancestor revision).
#[derive(Debug, Clone, PartialEq)]
pub struct Ancestor {
    pub index: usize,
    pub rev: String,
}

/// Column-wise scan over the winner's and each sibling's `(rev, date)`
/// lists. Extends while every list's `i`th entry is equal by the full
/// tuple (deliberately tuple equality, not `rev`-only, so a rewritten
/// revision with a reused identifier still counts as diverged). Returns
/// `None` if no shared prefix exists at all (`k == 0`), which the caller
/// treats as `NoCommonRevision`.
pub fn locate(winner: &[(String, String)], siblings: &[Vec<(String, String)>]) -> Option<Ancestor> {
    let mut index = 0;
    loop {
        let Some(column) = winner.get(index) else {
            break;
        };
        let all_match = siblings.iter().all(|s| s.get(index) == Some(column));
        if !all_match {
            break;
        }
        index += 1;
    }

    if index == 0 {
        return None;
    }

    Some(Ancestor {
        index,
        rev: winner[index - 1].0.clone(),
    })
}
