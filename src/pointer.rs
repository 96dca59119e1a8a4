// JSON Pointer (RFC 6901) helpers used by the patch engine.

use crate::error::PatchError;

/// Splits a pointer into its parent pointer and its last (unescaped) token.
///
/// `""` and pointers without a `/` are rejected (every pointer handled here
/// addresses a location inside a container, never the document root; root
/// replacement is handled specially by callers).
pub fn split(pointer: &str) -> Result<(&str, String), PatchError> {
    let idx = pointer
        .rfind('/')
        .ok_or_else(|| PatchError::PathNotFound(pointer.to_string()))?;
    let parent = &pointer[0..idx];
    let last = unescape(&pointer[idx + 1..]);
    Ok((parent, last))
}

/// Un-escapes the `~1` / `~0` sequences of a single RFC 6901 reference token.
pub fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Parses an array index token, rejecting leading zeroes per RFC 6901 and
/// out-of-bounds indices against `len`.
pub fn parse_index(token: &str, len: usize) -> Result<usize, PatchError> {
    if token.starts_with('0') && token.len() != 1 {
        return Err(PatchError::PatchConflict(
            token.to_string(),
            "leading zero in array index".to_string(),
        ));
    }
    match token.parse::<usize>() {
        Ok(idx) if idx < len => Ok(idx),
        _ => Err(PatchError::PatchConflict(
            token.to_string(),
            "array index out of range".to_string(),
        )),
    }
}
