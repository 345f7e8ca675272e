use serde_json::Value;
use crate::core::error::{Error, Result};
use crate::core::types::{DocId, Field, FieldValue};
use crate::schema::schema::{FieldDefinition, FieldType, Schema};

/// A record after type checking, before an id has been assigned
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub id: Option<DocId>,
    pub fields: Vec<Field>,
}

/// Turns raw JSON records into typed fields following schema order.
pub struct DocumentNormalizer<'a> {
    schema: &'a Schema,
    id_field: &'a str,
}

impl<'a> DocumentNormalizer<'a> {
    pub fn new(schema: &'a Schema, id_field: &'a str) -> Self {
        DocumentNormalizer { schema, id_field }
    }

    pub fn normalize(&self, record: &Value) -> Result<NormalizedRecord> {
        let object = record
            .as_object()
            .ok_or_else(|| Error::schema_mismatch("<record>", "expected a JSON object"))?;

        let id = match object.get(self.id_field) {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_doc_id(self.id_field, value)?),
        };

        let mut fields = Vec::new();
        for definition in &self.schema.fields {
            if let Some(value) = object.get(&definition.name) {
                normalize_value(definition, value, &mut fields)?;
            }
        }

        Ok(NormalizedRecord { id, fields })
    }
}

fn parse_doc_id(id_field: &str, value: &Value) -> Result<DocId> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(DocId)
            .ok_or_else(|| Error::schema_mismatch(id_field, "id must be a non-negative integer")),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map(DocId)
            .map_err(|_| Error::schema_mismatch(id_field, format!("id '{}' is not an integer", s))),
        _ => Err(Error::schema_mismatch(id_field, "id must be an integer or a numeric string")),
    }
}

fn normalize_value(definition: &FieldDefinition, value: &Value, out: &mut Vec<Field>) -> Result<()> {
    let name = definition.name.as_str();
    match (&definition.field_type, value) {
        (_, Value::Null) => Ok(()),

        (FieldType::Vector { dims }, Value::Array(items)) => {
            if items.len() != *dims {
                return Err(Error::schema_mismatch(
                    name,
                    format!("expected {} dimensions, got {}", dims, items.len()),
                ));
            }
            let mut vector = Vec::with_capacity(*dims);
            for item in items {
                let x = item
                    .as_f64()
                    .ok_or_else(|| Error::schema_mismatch(name, "vector components must be numbers"))?;
                vector.push(x as f32);
            }
            push(out, name, FieldValue::Vector(vector));
            Ok(())
        }
        (FieldType::Vector { .. }, _) => Err(Error::schema_mismatch(name, "expected an array of numbers")),

        // Multi-valued scalars
        (_, Value::Array(items)) => {
            for item in items {
                if item.is_array() {
                    return Err(Error::schema_mismatch(name, "nested arrays are not supported"));
                }
                normalize_value(definition, item, out)?;
            }
            Ok(())
        }

        (FieldType::Text, Value::String(s)) => {
            push(out, name, FieldValue::Text(s.clone()));
            Ok(())
        }
        (FieldType::Keyword, Value::String(s)) => {
            push(out, name, FieldValue::Keyword(s.clone()));
            Ok(())
        }
        (FieldType::Numeric, Value::Number(n)) => {
            let n = n
                .as_f64()
                .ok_or_else(|| Error::schema_mismatch(name, "number out of range"))?;
            push(out, name, FieldValue::Number(n));
            Ok(())
        }

        (FieldType::Text, other) | (FieldType::Keyword, other) => Err(Error::schema_mismatch(
            name,
            format!("expected a string, got {}", json_kind(other)),
        )),
        (FieldType::Numeric, other) => Err(Error::schema_mismatch(
            name,
            format!("expected a number, got {}", json_kind(other)),
        )),
    }
}

fn push(out: &mut Vec<Field>, name: &str, value: FieldValue) {
    out.push(Field {
        name: name.to_string(),
        value,
    });
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
