// Error types for the patch engine and pointer resolution.

use thiserror::Error;

/// Errors raised while applying or diffing a [`crate::patch::Patch`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PatchError {
    /// A JSON Pointer failed to resolve against the document.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// A structural precondition of an operation was violated (out-of-range
    /// array index, `test` mismatch, moving into one's own child, ...).
    #[error("patch conflict at {0}: {1}")]
    PatchConflict(String, String),

    /// A patch operation was missing a member RFC 6902 requires it to have.
    #[error("malformed patch: {0}")]
    MalformedPatch(String),
}
