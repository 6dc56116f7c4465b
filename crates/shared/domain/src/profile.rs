//! Profile records and the rules for reading them back.

use serde_json::{Map, Value};

use crate::constants::{COUCH_ID, COUCH_REV};
use crate::error::{DomainError, DomainResult};

/// A profile record: field name to JSON value.
///
/// Stored documents always carry `_id`, and `_rev` once the store has
/// accepted at least one write.
pub type ProfileAttributes = Map<String, Value>;

/// Keep only the requested fields, or every field when `names` is `None`.
pub fn project(attributes: &ProfileAttributes, names: Option<&[String]>) -> ProfileAttributes {
    attributes
        .iter()
        .filter(|(name, _)| names.map_or(true, |names| names.iter().any(|n| n == *name)))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Overlay `incoming` on `existing`. Incoming values win; fields only
/// present in `existing` are preserved.
pub fn merge(mut existing: ProfileAttributes, incoming: &ProfileAttributes) -> ProfileAttributes {
    for (name, value) in incoming {
        existing.insert(name.clone(), value.clone());
    }
    existing
}

/// Identifier of the record, if present as a string.
pub fn identifier(attributes: &ProfileAttributes) -> Option<&str> {
    attributes.get(COUCH_ID).and_then(Value::as_str)
}

/// Revision of the record, if present as a string.
pub fn revision(attributes: &ProfileAttributes) -> Option<&str> {
    attributes.get(COUCH_REV).and_then(Value::as_str)
}

/// Decode a raw document body into a profile record.
pub fn decode_attributes(body: &[u8]) -> DomainResult<ProfileAttributes> {
    Ok(serde_json::from_slice(body)?)
}

/// Decode a raw document body as a generic tree and extract its revision.
pub fn decode_revision(body: &[u8]) -> DomainResult<String> {
    let tree: Value = serde_json::from_slice(body)?;
    tree.get(COUCH_REV)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DomainError::decode(format!("document has no string {} field", COUCH_REV)))
}
