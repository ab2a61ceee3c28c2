//! Canvas Document Snapshots
//!
//! A snapshot is a serialized canvas document. The server treats it as an
//! opaque JSON object except for one key, `objects`, which it replaces with
//! the current history when re-deriving the snapshot.

use serde_json::{Map, Value};

/// Key holding the object list in a canvas document.
pub const OBJECTS_KEY: &str = "objects";

/// A parsed canvas document used as the base for snapshot derivation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    /// Empty document.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a base document from a client-supplied snapshot.
    ///
    /// Objects are taken as-is. Strings are parsed as JSON. Anything that
    /// does not yield a JSON object, including `null` and unparsable text,
    /// falls back to the empty document.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields: fields.clone() },
            Value::String(text) => Self::parse(text),
            _ => Self::empty(),
        }
    }

    /// Parse a serialized snapshot, falling back to the empty document.
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(fields)) => Self { fields },
            _ => Self::empty(),
        }
    }

    /// Build a base document from a stored snapshot, if any.
    pub fn from_snapshot(snapshot: Option<&str>) -> Self {
        snapshot.map(Self::parse).unwrap_or_default()
    }

    /// Replace the object list.
    pub fn with_objects<'a, I>(mut self, objects: I) -> Self
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let list = objects.into_iter().cloned().collect();
        self.fields.insert(OBJECTS_KEY.to_string(), Value::Array(list));
        self
    }

    /// Object list, if present.
    pub fn objects(&self) -> Option<&Vec<Value>> {
        self.fields.get(OBJECTS_KEY).and_then(Value::as_array)
    }

    /// Look up a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_object_keeps_fields() {
        let doc = Document::from_value(&json!({"version": "5.3.0", "background": "#fff"}));
        assert_eq!(doc.get("version"), Some(&json!("5.3.0")));
        assert_eq!(doc.get("background"), Some(&json!("#fff")));
    }

    #[test]
    fn test_from_string_parses() {
        let doc = Document::from_value(&json!(r#"{"version":"5.3.0","objects":[]}"#));
        assert_eq!(doc.get("version"), Some(&json!("5.3.0")));
        assert_eq!(doc.objects().map(Vec::len), Some(0));
    }

    #[test]
    fn test_invalid_inputs_fall_back_to_empty() {
        assert_eq!(Document::from_value(&Value::Null), Document::empty());
        assert_eq!(Document::from_value(&json!("{not json")), Document::empty());
        assert_eq!(Document::from_value(&json!("[1,2,3]")), Document::empty());
        assert_eq!(Document::from_value(&json!(17)), Document::empty());
        assert_eq!(Document::from_snapshot(None), Document::empty());
    }

    #[test]
    fn test_with_objects_replaces_list() {
        let history = vec![json!({"type": "path"}), json!({"type": "rect"})];
        let doc = Document::from_value(&json!({
            "version": "5.3.0",
            "objects": [{"type": "stale"}],
        }))
        .with_objects(&history);

        assert_eq!(doc.objects(), Some(&history));
        assert_eq!(doc.get("version"), Some(&json!("5.3.0")));
    }

    #[test]
    fn test_to_json_is_compact_and_reparses() {
        let doc = Document::empty().with_objects(&[json!({"type": "path"})]);
        let text = doc.to_json();
        assert!(!text.contains(' '));
        assert_eq!(Document::parse(&text), doc);
    }
}
