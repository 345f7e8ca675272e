use std::collections::HashSet;
use std::path::Path;
use serde::{Serialize, Deserialize};
use crate::compression::quantize::Quantization;
use crate::core::error::{Error, ErrorKind, Result};

/// Closed set of field kinds, resolved when a record is normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Tokenized and scored
    Text,
    /// Exact match only
    Keyword,
    /// Range queryable
    Numeric,
    /// Fixed-dimension float vector for nearest-neighbour search
    Vector { dims: usize },
}

/// Field definition with analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default = "default_true")]
    pub stored: bool,
    /// Mirror values into the columnar cache
    #[serde(default)]
    pub columnar: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
    /// Vector fields only: score nearest-neighbour searches on quantized codes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<Quantization>,
}

fn default_true() -> bool {
    true
}

impl FieldDefinition {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        FieldDefinition {
            name: name.to_string(),
            field_type,
            stored: true,
            columnar: !matches!(field_type, FieldType::Text),
            analyzer: None,
            quantization: None,
        }
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self.field_type, FieldType::Text | FieldType::Keyword)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<FieldDefinition>,
}

impl Schema {
    pub fn new() -> Self {
        Schema { fields: Vec::new() }
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn add_text_field(self, name: &str, analyzer: Option<String>) -> Self {
        let mut field = FieldDefinition::new(name, FieldType::Text);
        field.analyzer = analyzer;
        self.with_field(field)
    }

    pub fn add_keyword_field(self, name: &str) -> Self {
        self.with_field(FieldDefinition::new(name, FieldType::Keyword))
    }

    pub fn add_numeric_field(self, name: &str) -> Self {
        self.with_field(FieldDefinition::new(name, FieldType::Numeric))
    }

    pub fn add_vector_field(self, name: &str, dims: usize) -> Self {
        self.with_field(FieldDefinition::new(name, FieldType::Vector { dims }))
    }

    pub fn add_quantized_vector_field(self, name: &str, dims: usize, quantization: Quantization) -> Self {
        let mut field = FieldDefinition::new(name, FieldType::Vector { dims });
        field.quantization = Some(quantization);
        self.with_field(field)
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn text_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.field_type == FieldType::Text)
    }

    pub fn get_analyzer_for_field(&self, field_name: &str) -> Option<&String> {
        self.get_field(field_name).and_then(|f| f.analyzer.as_ref())
    }

    pub fn validate(&self, id_field: &str) -> Result<()> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() || field.name.contains('\0') || field.name.contains(':') {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("invalid field name '{}'", field.name),
                ));
            }
            if field.name == id_field {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("field '{}' collides with the id field", field.name),
                ));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("duplicate field '{}'", field.name),
                ));
            }
            if field.quantization.is_some() && !matches!(field.field_type, FieldType::Vector { .. }) {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("field '{}' is not a vector field and cannot be quantized", field.name),
                ));
            }
            if let FieldType::Vector { dims: 0 } = field.field_type {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("vector field '{}' needs at least one dimension", field.name),
                ));
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(path)?;
        Ok(Some(serde_json::from_slice(&data)?))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_json_shape() {
        let schema = Schema::new()
            .add_text_field("title", None)
            .add_numeric_field("price")
            .add_vector_field("emb", 4);

        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["fields"][0]["type"], "text");
        assert_eq!(json["fields"][2]["type"]["vector"]["dims"], 4);
        assert!(json["fields"][2].get("quantization").is_none());

        let back: Schema = serde_json::from_value(json).unwrap();
        assert_eq!(back, schema);
        assert!(back.get_field("price").unwrap().columnar);
        assert!(!back.get_field("title").unwrap().columnar);
    }

    #[test]
    fn test_quantization_round_trips_through_json() {
        let schema = Schema::new().add_quantized_vector_field("emb", 8, Quantization::Binary);
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["fields"][0]["quantization"], "binary");
        let back: Schema = serde_json::from_value(json).unwrap();
        assert_eq!(back.get_field("emb").unwrap().quantization, Some(Quantization::Binary));
        assert!(back.validate("id").is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_id_collisions() {
        let dup = Schema::new().add_keyword_field("tag").add_keyword_field("tag");
        assert!(dup.validate("id").is_err());

        let collide = Schema::new().add_keyword_field("id");
        assert!(collide.validate("id").is_err());

        let zero = Schema::new().add_vector_field("emb", 0);
        assert!(zero.validate("id").is_err());

        let mut quantized_text = FieldDefinition::new("body", FieldType::Text);
        quantized_text.quantization = Some(Quantization::Int8);
        assert!(Schema::new().with_field(quantized_text).validate("id").is_err());

        let ok = Schema::new().add_text_field("body", Some("english".into()));
        assert!(ok.validate("id").is_ok());
        assert_eq!(ok.get_analyzer_for_field("body").map(String::as_str), Some("english"));
    }
}
