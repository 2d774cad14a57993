use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::models::{CoreError, CoreErrorKind, CoreResult};

/// Process-wide key/value configuration consulted for runner constructor
/// arguments.
pub trait ConfigSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StaticConfigSource {
    values: BTreeMap<String, String>,
}

impl StaticConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl ConfigSource for StaticConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Reads configuration from environment variables. `dispatch.runners.noop.kwargs`
/// becomes `DISPATCH_RUNNERS_NOOP_KWARGS`.
#[derive(Clone, Debug, Default)]
pub struct EnvConfigSource {
    prefix: Option<String>,
}

impl EnvConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    pub fn variable_name(&self, key: &str) -> String {
        let mut name = String::new();
        if let Some(prefix) = &self.prefix {
            name.push_str(&prefix.to_ascii_uppercase());
            name.push('_');
        }
        name.extend(key.chars().map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_uppercase()
            } else {
                '_'
            }
        }));
        name
    }
}

impl ConfigSource for EnvConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(self.variable_name(key)).ok()
    }
}

pub fn kwargs_key(namespace: &str, name: &str) -> String {
    format!("{namespace}.{name}.kwargs")
}

/// Parsed constructor arguments for one runner implementation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunnerConfig {
    values: Map<String, Value>,
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Absent or blank text is an empty configuration; anything else must be
    /// a JSON object.
    pub fn parse(raw: Option<&str>) -> CoreResult<Self> {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Ok(Self::default());
        };

        let value: Value = serde_json::from_str(raw).map_err(|error| {
            CoreError::new(
                CoreErrorKind::ConfigParse,
                format!("failed to JSON parse runner settings: {error}"),
            )
        })?;

        match value {
            Value::Object(values) => Ok(Self { values }),
            other => Err(CoreError::new(
                CoreErrorKind::ConfigParse,
                format!("runner settings must be a JSON object, found {}", json_kind(&other)),
            )),
        }
    }

    pub fn load(source: &dyn ConfigSource, namespace: &str, name: &str) -> CoreResult<Self> {
        let raw = source.get(&kwargs_key(namespace, name));
        Self::parse(raw.as_deref()).map_err(|error| error.with_runner(name))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Deserializes the arguments into a typed settings struct.
    pub fn decode<T: DeserializeOwned>(&self) -> CoreResult<T> {
        serde_json::from_value(Value::Object(self.values.clone())).map_err(|error| {
            CoreError::new(
                CoreErrorKind::ConfigParse,
                format!("invalid runner settings: {error}"),
            )
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
