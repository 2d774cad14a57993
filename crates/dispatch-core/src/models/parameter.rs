use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

pub type ParameterMap = BTreeMap<String, ParameterValue>;
pub type SchemaMap = BTreeMap<String, ParameterSchema>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParameterType {
    pub const ALL: [ParameterType; 5] = [
        Self::String,
        Self::Number,
        Self::Boolean,
        Self::Object,
        Self::Array,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

impl Display for ParameterType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ParameterType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            "object" => Ok(Self::Object),
            "array" => Ok(Self::Array),
            _ => Err(()),
        }
    }
}

/// A single parameter value. JSON `null` has no representation here; an
/// absent value is modelled by the key being missing from the map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Boolean(bool),
    Number(Number),
    String(String),
    Array(Vec<ParameterValue>),
    Object(BTreeMap<String, ParameterValue>),
}

impl ParameterValue {
    pub fn kind(&self) -> ParameterType {
        match self {
            Self::Boolean(_) => ParameterType::Boolean,
            Self::Number(_) => ParameterType::Number,
            Self::String(_) => ParameterType::String,
            Self::Array(_) => ParameterType::Array,
            Self::Object(_) => ParameterType::Object,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(value) => value.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => value.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, ParameterValue>> {
        match self {
            Self::Object(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Vec<ParameterValue>> for ParameterValue {
    fn from(value: Vec<ParameterValue>) -> Self {
        Self::Array(value)
    }
}

impl From<ParameterValue> for Value {
    fn from(value: ParameterValue) -> Self {
        match value {
            ParameterValue::Boolean(value) => Value::Bool(value),
            ParameterValue::Number(value) => Value::Number(value),
            ParameterValue::String(value) => Value::String(value),
            ParameterValue::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            ParameterValue::Object(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NullParameterValue;

impl Display for NullParameterValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("null is not a valid parameter value")
    }
}

impl std::error::Error for NullParameterValue {}

impl TryFrom<Value> for ParameterValue {
    type Error = NullParameterValue;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Err(NullParameterValue),
            Value::Bool(value) => Ok(Self::Boolean(value)),
            Value::Number(value) => Ok(Self::Number(value)),
            Value::String(value) => Ok(Self::String(value)),
            Value::Array(items) => items
                .into_iter()
                .map(ParameterValue::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Array),
            Value::Object(entries) => entries
                .into_iter()
                .map(|(key, value)| ParameterValue::try_from(value).map(|value| (key, value)))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Self::Object),
        }
    }
}

pub fn parameters_to_json(parameters: &ParameterMap) -> Value {
    Value::Object(
        parameters
            .iter()
            .map(|(name, value)| (name.clone(), Value::from(value.clone())))
            .collect(),
    )
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParameterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
}

impl ParameterSchema {
    pub fn new(param_type: ParameterType) -> Self {
        Self {
            param_type,
            default: None,
            description: None,
            required: false,
        }
    }

    pub fn with_default(mut self, default: impl Into<ParameterValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn accepts(&self, value: &ParameterValue) -> bool {
        value.kind() == self.param_type
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ParameterSchema, ParameterType, ParameterValue};

    #[test]
    fn json_null_is_rejected() {
        assert!(ParameterValue::try_from(json!(null)).is_err());
        assert!(ParameterValue::try_from(json!({"nested": [1, null]})).is_err());
    }

    #[test]
    fn integer_numbers_stay_integers() {
        let value: ParameterValue = serde_json::from_str("10").unwrap();
        assert_eq!(value, ParameterValue::from(10));
        assert_eq!(value.as_i64(), Some(10));
        assert_eq!(value.kind(), ParameterType::Number);
    }

    #[test]
    fn schema_uses_type_key_on_the_wire() {
        let schema: ParameterSchema =
            serde_json::from_value(json!({"type": "number", "default": 10})).unwrap();
        assert_eq!(schema, ParameterSchema::new(ParameterType::Number).with_default(10));
        assert!(!schema.required);

        let encoded = serde_json::to_value(&schema).unwrap();
        assert_eq!(encoded, json!({"type": "number", "default": 10}));
    }

    #[test]
    fn string_values_do_not_satisfy_number_schemas() {
        let schema = ParameterSchema::new(ParameterType::Number);
        assert!(!schema.accepts(&ParameterValue::from("10")));
        assert!(schema.accepts(&ParameterValue::from(10)));
    }
}
