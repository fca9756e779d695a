//! Mapped, submission-ready records

use super::target::ImportTarget;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Coerced field value as sent to the remote store
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    /// No value and no default; serialized as JSON `null`
    Null,
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

/// One mapped row, immutable once built
///
/// Serializes as a flat JSON object (field name → value), which is the
/// body of the remote create call.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainRecord {
    target: ImportTarget,
    fields: Vec<(&'static str, FieldValue)>,
}

impl DomainRecord {
    pub fn new(target: ImportTarget, fields: Vec<(&'static str, FieldValue)>) -> Self {
        Self { target, fields }
    }

    pub fn target(&self) -> ImportTarget {
        self.target
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    pub fn fields(&self) -> &[(&'static str, FieldValue)] {
        &self.fields
    }
}

impl Serialize for DomainRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_flat_object_with_nulls() {
        let record = DomainRecord::new(
            ImportTarget::Customer,
            vec![
                ("name", FieldValue::Text("Jane Doe".into())),
                ("email", FieldValue::Null),
                ("is_active", FieldValue::Integer(1)),
            ],
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "Jane Doe", "email": null, "is_active": 1})
        );
    }
}
