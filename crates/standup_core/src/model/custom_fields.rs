//! Open-ended per-task fields, persisted as one serialized JSON column.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CustomFields(BTreeMap<String, Value>);

impl CustomFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Applies `updates` key by key. A `null` value removes the key; keys
    /// absent from `updates` are left alone. Returns whether anything changed.
    pub fn merge(&mut self, updates: BTreeMap<String, Value>) -> bool {
        let mut changed = false;
        for (key, value) in updates {
            if value.is_null() {
                changed |= self.0.remove(&key).is_some();
            } else if self.0.get(&key) != Some(&value) {
                self.0.insert(key, value);
                changed = true;
            }
        }
        changed
    }
}

impl From<BTreeMap<String, Value>> for CustomFields {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for CustomFields {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub fn encode(fields: &CustomFields) -> String {
    let object: Map<String, Value> = fields
        .0
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(object).to_string()
}

/// Best-effort inverse of [`encode`]. Anything that is not a JSON object
/// decodes to the empty mapping.
pub fn decode(serialized: &str) -> CustomFields {
    if serialized.trim().is_empty() {
        return CustomFields::new();
    }

    match serde_json::from_str::<Value>(serialized) {
        Ok(Value::Object(object)) => object.into_iter().collect(),
        Ok(other) => {
            tracing::warn!(kind = json_kind(&other), "custom fields column is not an object");
            CustomFields::new()
        }
        Err(err) => {
            tracing::warn!(error = %err, "custom fields column is not valid JSON");
            CustomFields::new()
        }
    }
}

/// Text form of a value for a CSV cell.
pub fn render_cell(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Serde adapter storing [`CustomFields`] as its encoded string.
pub mod column {
    use super::{CustomFields, decode, encode};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(fields: &CustomFields, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(fields))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<CustomFields, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(decode).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::{CustomFields, decode, encode, render_cell};
    use proptest::prelude::*;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;

    fn fields(value: Value) -> CustomFields {
        match value {
            Value::Object(object) => object.into_iter().collect(),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn empty_mapping_round_trips() {
        let empty = CustomFields::new();
        assert_eq!(encode(&empty), "{}");
        assert_eq!(decode(&encode(&empty)), empty);
    }

    #[test]
    fn decode_tolerates_malformed_input() {
        assert!(decode("").is_empty());
        assert!(decode("{ not json").is_empty());
        assert!(decode("[1, 2, 3]").is_empty());
        assert!(decode("\"text\"").is_empty());
    }

    #[test]
    fn decode_keeps_unknown_keys_and_types() {
        let decoded = decode(r#"{"Sprint": 7, "Owner": "ana", "Blocked": false}"#);
        assert_eq!(decoded.get("Sprint"), Some(&json!(7)));
        assert_eq!(decoded.get("Owner"), Some(&json!("ana")));
        assert_eq!(decoded.get("Blocked"), Some(&json!(false)));
    }

    #[test]
    fn merge_adds_replaces_and_removes() {
        let mut current = fields(json!({"owner": "ana", "sprint": 7, "team": "core"}));
        let updates: BTreeMap<String, Value> = [
            ("owner".to_string(), json!("ben")),
            ("sprint".to_string(), Value::Null),
            ("risk".to_string(), json!("low")),
        ]
        .into_iter()
        .collect();

        assert!(current.merge(updates));
        assert_eq!(
            current,
            fields(json!({"owner": "ben", "team": "core", "risk": "low"}))
        );
    }

    #[test]
    fn merge_reports_no_change_for_identical_values() {
        let mut current = fields(json!({"owner": "ana"}));
        let updates: BTreeMap<String, Value> = [
            ("owner".to_string(), json!("ana")),
            ("missing".to_string(), Value::Null),
        ]
        .into_iter()
        .collect();

        assert!(!current.merge(updates));
        assert_eq!(current, fields(json!({"owner": "ana"})));
    }

    #[test]
    fn render_cell_keeps_strings_verbatim() {
        assert_eq!(render_cell(&json!("a, b")), "a, b");
        assert_eq!(render_cell(&json!(12)), "12");
        assert_eq!(render_cell(&json!(["x"])), "[\"x\"]");
        assert_eq!(render_cell(&Value::Null), "");
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<String>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            Just(Value::Null),
        ]
    }

    proptest! {
        #[test]
        fn encode_then_decode_is_identity(map in prop::collection::btree_map(any::<String>(), leaf(), 0..8)) {
            let original = CustomFields::from(map);
            prop_assert_eq!(decode(&encode(&original)), original);
        }
    }
}
