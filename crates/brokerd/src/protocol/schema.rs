//! Field descriptors and the tolerant `data` decoder.
//!
//! Decoding keeps only the fields a schema declares. Missing optional fields
//! take the declared default when there is one and are otherwise left out;
//! JSON `null` counts as missing.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// JSON shape a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// JSON string.
    String,
    /// JSON number without a fractional part.
    Integer,
    /// Any JSON number.
    Float,
    /// JSON boolean.
    Boolean,
    /// JSON object.
    Object,
    /// JSON array.
    Array,
    /// Any non-null value.
    Any,
}

impl FieldKind {
    /// Lowercase name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Any => "any",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    name: String,
    kind: FieldKind,
    required: bool,
    default: Option<Value>,
}

impl FieldSpec {
    /// Field name as it appears in `data`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expected JSON shape.
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Whether decoding fails when the field is missing.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Value substituted when an optional field is missing.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

/// Ordered field list describing a registered type's `data`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// Creates a schema with no fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a field that must be present.
    #[must_use]
    pub fn required(self, name: &str, kind: FieldKind) -> Self {
        self.field(name, kind, true, None)
    }

    /// Declares a field that may be absent.
    #[must_use]
    pub fn optional(self, name: &str, kind: FieldKind) -> Self {
        self.field(name, kind, false, None)
    }

    /// Declares an optional field filled with `default` when absent.
    #[must_use]
    pub fn with_default(self, name: &str, kind: FieldKind, default: Value) -> Self {
        self.field(name, kind, false, Some(default))
    }

    /// Declared fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Decodes `data` against this schema.
    ///
    /// Absent or `null` data is treated as an empty object.
    pub fn decode(&self, data: Option<&Value>) -> Result<Value, SchemaViolation> {
        let empty = Map::new();
        let object = match data {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(object)) => object,
            Some(other) => {
                return Err(SchemaViolation::NotAnObject {
                    found: json_type(other),
                });
            }
        };
        let mut decoded = Map::new();
        for field in &self.fields {
            match object.get(&field.name).filter(|value| !value.is_null()) {
                Some(value) if field.kind.accepts(value) => {
                    decoded.insert(field.name.clone(), value.clone());
                }
                Some(value) => {
                    return Err(SchemaViolation::WrongKind {
                        field: field.name.clone(),
                        expected: field.kind,
                        found: json_type(value),
                    });
                }
                None if field.required => {
                    return Err(SchemaViolation::MissingField {
                        field: field.name.clone(),
                    });
                }
                None => {
                    if let Some(default) = &field.default {
                        decoded.insert(field.name.clone(), default.clone());
                    }
                }
            }
        }
        Ok(Value::Object(decoded))
    }

    fn field(mut self, name: &str, kind: FieldKind, required: bool, default: Option<Value>) -> Self {
        let spec = FieldSpec {
            name: name.to_owned(),
            kind,
            required,
            default,
        };
        match self.fields.iter_mut().find(|field| field.name == name) {
            Some(existing) => *existing = spec,
            None => self.fields.push(spec),
        }
        self
    }
}

/// Reasons `data` fails to decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    /// `data` was present but not an object.
    #[error("data must be an object, found {found}")]
    NotAnObject { found: &'static str },
    /// A required field was absent or null.
    #[error("missing required field '{field}'")]
    MissingField { field: String },
    /// A field had the wrong JSON shape.
    #[error("field '{field}' must be {expected}, found {found}")]
    WrongKind {
        field: String,
        expected: FieldKind,
        found: &'static str,
    },
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;

    #[fixture]
    fn product() -> Schema {
        Schema::new()
            .required("name", FieldKind::String)
            .optional("sku", FieldKind::String)
            .with_default("quantity", FieldKind::Integer, json!(0))
            .optional("price", FieldKind::Float)
    }

    #[rstest]
    fn unknown_fields_are_discarded(product: Schema) {
        let decoded = product
            .decode(Some(&json!({ "name": "lamp", "colour": "red" })))
            .expect("decode");
        assert_eq!(decoded, json!({ "name": "lamp", "quantity": 0 }));
    }

    #[rstest]
    fn conforming_data_is_preserved(product: Schema) {
        let data = json!({ "name": "lamp", "sku": "L-1", "quantity": 3, "price": 9.5 });
        assert_eq!(product.decode(Some(&data)).expect("decode"), data);
    }

    #[rstest]
    fn integers_satisfy_float_fields(product: Schema) {
        let decoded = product
            .decode(Some(&json!({ "name": "lamp", "price": 10 })))
            .expect("decode");
        assert_eq!(decoded.get("price"), Some(&json!(10)));
    }

    #[rstest]
    #[case(json!({}), SchemaViolation::MissingField { field: "name".to_owned() })]
    #[case(json!({ "name": null }), SchemaViolation::MissingField { field: "name".to_owned() })]
    #[case(
        json!({ "name": 7 }),
        SchemaViolation::WrongKind { field: "name".to_owned(), expected: FieldKind::String, found: "number" }
    )]
    #[case(
        json!({ "name": "lamp", "quantity": 1.5 }),
        SchemaViolation::WrongKind { field: "quantity".to_owned(), expected: FieldKind::Integer, found: "number" }
    )]
    #[case(json!(["name"]), SchemaViolation::NotAnObject { found: "array" })]
    fn violations_are_reported(product: Schema, #[case] data: Value, #[case] expected: SchemaViolation) {
        assert_eq!(product.decode(Some(&data)), Err(expected));
    }

    #[test]
    fn absent_data_decodes_as_empty_object() {
        let schema = Schema::new().with_default("ping", FieldKind::String, json!(""));
        assert_eq!(schema.decode(None).expect("decode"), json!({ "ping": "" }));
    }

    #[test]
    fn redeclaring_a_field_replaces_it() {
        let schema = Schema::new()
            .required("id", FieldKind::String)
            .optional("id", FieldKind::Integer);
        assert_eq!(schema.fields().len(), 1);
        let field = schema.get("id").expect("field");
        assert_eq!(field.kind(), FieldKind::Integer);
        assert!(!field.is_required());
    }
}
