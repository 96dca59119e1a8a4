// JSON Patch engine: a restricted RFC 6902 dialect with a conflict-tolerant
// `add`, plus a structural `diff` that produces a round-trip-faithful patch.
//
// The `add` deviation: adding at an object key that already holds an array,
// with a new array value, concatenates rather than overwrites. This lets
// the reconstructor/merger replay two independent sibling appends to the
// same array field without one clobbering the other.

use std::mem;

use serde_json::{Map, Value};

use crate::error::PatchError;
use crate::pointer;

/// A single JSON Patch operation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op")]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

/// An ordered sequence of [`PatchOp`]s.
pub type Patch = Vec<PatchOp>;

/// Applies `patch` to `doc` in place. On failure, `doc` may be left
/// partially modified by prior operations in the sequence; callers that
/// need atomicity should apply to a clone and swap it in on success, which
/// is how the reconstructor and merger use this function.
pub fn apply(doc: &mut Value, patch: &Patch) -> Result<(), PatchError> {
    for op in patch {
        apply_one(doc, op)?;
    }
    Ok(())
}

/// Applies `patch` to a clone of `doc`, returning the new value only if
/// every operation succeeds.
pub fn apply_cloned(doc: &Value, patch: &Patch) -> Result<Value, PatchError> {
    let mut next = doc.clone();
    apply(&mut next, patch)?;
    Ok(next)
}

fn apply_one(doc: &mut Value, op: &PatchOp) -> Result<(), PatchError> {
    match op {
        PatchOp::Add { path, value } => {
            add(doc, path, value.clone())?;
        }
        PatchOp::Remove { path } => {
            remove(doc, path, false)?;
        }
        PatchOp::Replace { path, value } => {
            replace(doc, path, value.clone())?;
        }
        PatchOp::Move { from, path } => {
            let val = mov(doc, from, path)?;
            let _ = val;
        }
        PatchOp::Copy { from, path } => {
            copy(doc, from, path)?;
        }
        PatchOp::Test { path, value } => {
            test(doc, path, value)?;
        }
    }
    Ok(())
}

fn add(doc: &mut Value, path: &str, value: Value) -> Result<(), PatchError> {
    if path.is_empty() {
        *doc = value;
        return Ok(());
    }

    let (parent_ptr, last) = pointer::split(path)?;
    let parent = doc
        .pointer_mut(parent_ptr)
        .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;

    match parent {
        Value::Array(arr) => {
            if last == "-" {
                arr.push(value);
            } else {
                let idx = pointer::parse_index(&last, arr.len() + 1)?;
                arr.insert(idx, value);
            }
        }
        Value::Object(obj) => {
            set_or_merge(obj, last, value);
        }
        _ => {
            return Err(PatchError::PatchConflict(
                path.to_string(),
                "add target's parent is not a container".to_string(),
            ));
        }
    }
    Ok(())
}

/// Implements the conflict-tolerant add-at-existing-key rule: if both the
/// existing value and the incoming value are arrays, concatenate them
/// (existing ++ incoming); otherwise overwrite.
fn set_or_merge(obj: &mut Map<String, Value>, key: String, value: Value) {
    match obj.get_mut(&key) {
        Some(Value::Array(existing)) => {
            if let Value::Array(mut incoming) = value {
                existing.append(&mut incoming);
            } else {
                obj.insert(key, value);
            }
        }
        _ => {
            obj.insert(key, value);
        }
    }
}

fn remove(doc: &mut Value, path: &str, allow_tail: bool) -> Result<Value, PatchError> {
    let (parent_ptr, last) = pointer::split(path)?;
    let parent = doc
        .pointer_mut(parent_ptr)
        .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;

    match parent {
        Value::Object(obj) => obj
            .remove(&last)
            .ok_or_else(|| PatchError::PathNotFound(path.to_string())),
        Value::Array(arr) => {
            if allow_tail && last == "-" {
                arr.pop()
                    .ok_or_else(|| PatchError::PatchConflict(path.to_string(), "array is empty".to_string()))
            } else {
                let idx = pointer::parse_index(&last, arr.len())?;
                Ok(arr.remove(idx))
            }
        }
        _ => Err(PatchError::PatchConflict(
            path.to_string(),
            "remove target's parent is not a container".to_string(),
        )),
    }
}

fn replace(doc: &mut Value, path: &str, value: Value) -> Result<Value, PatchError> {
    let target = doc
        .pointer_mut(path)
        .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
    Ok(mem::replace(target, value))
}

fn mov(doc: &mut Value, from: &str, path: &str) -> Result<(), PatchError> {
    if path.starts_with(from) && path[from.len()..].starts_with('/') {
        return Err(PatchError::PatchConflict(
            path.to_string(),
            "cannot move into own child".to_string(),
        ));
    }
    let val = remove(doc, from, true)?;
    add(doc, path, val)
}

fn copy(doc: &mut Value, from: &str, path: &str) -> Result<(), PatchError> {
    let value = doc
        .pointer(from)
        .ok_or_else(|| PatchError::PathNotFound(from.to_string()))?
        .clone();
    add(doc, path, value)
}

fn test(doc: &Value, path: &str, expected: &Value) -> Result<(), PatchError> {
    let actual = doc
        .pointer(path)
        .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
    if actual == expected {
        Ok(())
    } else {
        Err(PatchError::PatchConflict(
            path.to_string(),
            "test value mismatch".to_string(),
        ))
    }
}

/// Produces a patch such that `apply(a, diff(a, b)) == b`. Op minimization
/// is not a contract here, only round-trip faithfulness, so this walks the
/// two trees structurally and emits `replace`/`remove`/`add` at the points
/// where they differ, recursing into objects and arrays.
pub fn diff(a: &Value, b: &Value) -> Patch {
    let mut ops = Vec::new();
    diff_at(a, b, "", &mut ops);
    ops
}

fn diff_at(a: &Value, b: &Value, path: &str, ops: &mut Patch) {
    if a == b {
        return;
    }

    match (a, b) {
        (Value::Object(ao), Value::Object(bo)) => {
            for (k, bv) in bo {
                let child = format!("{path}/{}", escape_token(k));
                match ao.get(k) {
                    Some(av) => diff_at(av, bv, &child, ops),
                    None => ops.push(PatchOp::Add {
                        path: child,
                        value: bv.clone(),
                    }),
                }
            }
            for k in ao.keys() {
                if !bo.contains_key(k) {
                    let child = format!("{path}/{}", escape_token(k));
                    ops.push(PatchOp::Remove { path: child });
                }
            }
        }
        (Value::Array(aa), Value::Array(ba)) => {
            diff_array(aa, ba, path, ops);
        }
        _ => {
            ops.push(PatchOp::Replace {
                path: path.to_string(),
                value: b.clone(),
            });
        }
    }
}

/// Arrays are diffed positionally: shared prefix entries are diffed
/// recursively, then either trailing `a` entries are removed (from the
/// tail backward, so indices stay valid) or trailing `b` entries are
/// appended.
fn diff_array(a: &[Value], b: &[Value], path: &str, ops: &mut Patch) {
    let common = a.len().min(b.len());
    for i in 0..common {
        let child = format!("{path}/{i}");
        diff_at(&a[i], &b[i], &child, ops);
    }
    if a.len() > b.len() {
        for i in (b.len()..a.len()).rev() {
            ops.push(PatchOp::Remove {
                path: format!("{path}/{i}"),
            });
        }
    } else {
        for item in &b[common..] {
            ops.push(PatchOp::Add {
                path: format!("{path}/-"),
                value: item.clone(),
            });
        }
    }
}

fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
