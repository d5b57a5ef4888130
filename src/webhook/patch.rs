//! JSON-Patch construction for the project annotation

use std::collections::BTreeMap;

use json_patch::{AddOperation, Patch, PatchOperation};
use jsonptr::{PointerBuf, Token};
use serde_json::Value;

/// Escape one reference token per RFC 6901 (`~` to `~0`, `/` to `~1`)
pub fn escape_json_pointer(token: &str) -> String {
    Token::new(token).encoded().to_string()
}

/// Build the patch that sets annotation `key` to `value`.
///
/// Without an annotation map the container is added first, as its own
/// operation. Otherwise a single `add` upserts the key.
pub fn build_annotation_patch(
    annotations: Option<&BTreeMap<String, String>>,
    key: &str,
    value: &str,
) -> Patch {
    let mut ops = Vec::with_capacity(2);

    if annotations.is_none() {
        ops.push(PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["metadata", "annotations"]),
            value: Value::Object(Default::default()),
        }));
    }

    ops.push(PatchOperation::Add(AddOperation {
        path: PointerBuf::from_tokens(["metadata", "annotations", key]),
        value: Value::String(value.to_string()),
    }));

    Patch(ops)
}
