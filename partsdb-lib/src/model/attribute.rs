use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single `(name, value)` attribute of a component.
///
/// Serialized as a two-element JSON array, which is also the line format of the
/// attribute lookup table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributePair(pub String, pub Value);

impl AttributePair {
    #[must_use]
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self(name.into(), value)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.1
    }

    /// Stable content key used for deduplication.
    ///
    /// Two pairs produce the same key exactly when they are structurally equal,
    /// regardless of the insertion order of keys inside structured values. Objects
    /// are kept in a sorted map, so compact serialization is already canonical.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        format!("[{},{}]", Value::from(self.0.as_str()), self.1)
    }

    /// Human-readable rendering of the value, used for attribute filters and display.
    ///
    /// Structured values of the form `{format, primary, values: {name: [value, unit]}}`
    /// render as their primary value.
    #[must_use]
    pub fn display_value(&self) -> String {
        display(&self.1)
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Object(map) => {
            let primary = map.get("primary").and_then(Value::as_str);
            let entry = primary.and_then(|p| map.get("values").and_then(|v| v.get(p)));
            match entry {
                Some(Value::Array(parts)) if !parts.is_empty() => display(&parts[0]),
                Some(other) => display(other),
                None => value.to_string(),
            }
        }
        other => other.to_string(),
    }
}
