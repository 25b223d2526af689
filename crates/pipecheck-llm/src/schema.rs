use crate::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Primitive type tags shared by state schemas and structured-output schemas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Integer,
    Float,
    Boolean,
    List,
    Map,
}

impl ValueType {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim() {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "float" => Some(Self::Float),
            "boolean" => Some(Self::Boolean),
            "list" => Some(Self::List),
            "map" => Some(Self::Map),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::List => "list",
            Self::Map => "map",
        }
    }

    /// Integers are accepted where a float is declared; the reverse is not.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Map => value.is_object(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub fields: Vec<SchemaField>,
}

impl OutputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.fields.push(SchemaField {
            name: name.into(),
            value_type,
        });
        self
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    /// Checks every declared field is present with the declared type and
    /// returns only the declared fields.
    pub fn validate(&self, fields: &Map<String, Value>) -> Result<Map<String, Value>, ModelError> {
        let mut validated = Map::new();
        for field in &self.fields {
            let value = fields.get(&field.name).ok_or_else(|| {
                ModelError::Parse(format!("missing declared field '{}'", field.name))
            })?;
            if !field.value_type.matches(value) {
                return Err(ModelError::Parse(format!(
                    "field '{}' expected {} but got {}",
                    field.name,
                    field.value_type.as_str(),
                    json_type_name(value)
                )));
            }
            validated.insert(field.name.clone(), value.clone());
        }
        Ok(validated)
    }
}

/// Parses a free-text model reply into a validated field map.
///
/// Accepts a bare JSON object, a fenced ```json block, or prose wrapped
/// around a single object.
pub fn parse_structured_response(
    text: &str,
    schema: &OutputSchema,
) -> Result<Map<String, Value>, ModelError> {
    let candidate = extract_json_object(text)
        .ok_or_else(|| ModelError::Parse("response does not contain a JSON object".to_string()))?;
    let parsed: Value = serde_json::from_str(candidate)
        .map_err(|err| ModelError::Parse(format!("malformed JSON object: {err}")))?;
    let Value::Object(fields) = parsed else {
        return Err(ModelError::Parse(format!(
            "expected a JSON object but got {}",
            json_type_name(&parsed)
        )));
    };
    schema.validate(&fields)
}

fn extract_json_object(text: &str) -> Option<&str> {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        body = rest.trim_end().trim_end_matches("```").trim();
    }
    if body.starts_with('{') && body.ends_with('}') {
        return Some(body);
    }
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}
