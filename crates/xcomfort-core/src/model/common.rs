// ── Common types shared across the domain model ──

use serde_json::{Map, Value};

use crate::error::DispatchError;

pub type DeviceId = i64;
pub type RoomId = i64;
pub type CompId = i64;

/// Union of every partial payload an entity has received.
pub type RawState = Map<String, Value>;

/// Capability shared by every entity the bridge pushes.
pub trait Entity {
    /// Fold one full or partial payload into the entity and publish the
    /// resulting snapshot.
    fn apply(&self, payload: &Value) -> Result<(), DispatchError>;

    /// One-line human-readable description.
    fn describe(&self) -> String;
}

pub(crate) fn as_object<'a>(payload: &'a Value, kind: &'static str) -> Result<&'a RawState, DispatchError> {
    payload.as_object().ok_or(DispatchError::NotAnObject { kind })
}

/// `prev` with every field of `payload` written over it.
pub(crate) fn merged(prev: Option<&RawState>, payload: &RawState) -> RawState {
    let mut raw = prev.cloned().unwrap_or_default();
    for (key, value) in payload {
        raw.insert(key.clone(), value.clone());
    }
    raw
}

/// Numbers and numeric strings; the bridge sends both.
pub(crate) fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// `true`/`false`, or a nonzero/zero integer.
pub(crate) fn flag(value: &Value) -> Option<bool> {
    value.as_bool().or_else(|| integer(value).map(|i| i != 0))
}

pub(crate) fn required_id(
    item: &RawState,
    field: &'static str,
    kind: &'static str,
) -> Result<i64, DispatchError> {
    let value = item
        .get(field)
        .ok_or(DispatchError::MissingField { kind, field })?;
    integer(value).ok_or_else(|| DispatchError::InvalidField {
        kind,
        field,
        value: value.to_string(),
    })
}

pub(crate) fn name_of(item: &RawState) -> String {
    item.get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_keeps_absent_fields_and_overwrites_present_ones() {
        let first = json!({ "a": 1, "b": 2 });
        let second = json!({ "b": 3, "c": 4 });

        let raw = merged(None, first.as_object().unwrap());
        let raw = merged(Some(&raw), second.as_object().unwrap());
        assert_eq!(Value::Object(raw), json!({ "a": 1, "b": 3, "c": 4 }));
    }

    #[test]
    fn numbers_accept_numeric_strings() {
        assert_eq!(number(&json!("20.9")), Some(20.9));
        assert_eq!(number(&json!(42.5)), Some(42.5));
        assert_eq!(number(&json!("warm")), None);
        assert_eq!(integer(&json!(7.0)), Some(7));
        assert_eq!(integer(&json!(7.5)), None);
        assert_eq!(integer(&json!("12")), Some(12));
    }

    #[test]
    fn missing_and_invalid_ids() {
        let item = json!({ "deviceId": "x" });
        let item = item.as_object().unwrap();
        assert_eq!(
            required_id(item, "roomId", "room"),
            Err(DispatchError::MissingField { kind: "room", field: "roomId" })
        );
        assert!(matches!(
            required_id(item, "deviceId", "device"),
            Err(DispatchError::InvalidField { .. })
        ));
    }
}
