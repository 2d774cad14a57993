use serde::{Deserialize, Serialize};

use crate::models::SchemaMap;

/// Administrative definition of a runner type. `runner_module` is the key the
/// extension registry resolves to a concrete implementation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunnerDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    #[serde(default)]
    pub runner_parameters: SchemaMap,
    pub runner_module: String,
}

impl RunnerDescriptor {
    pub fn new(name: impl Into<String>, runner_module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            enabled: true,
            runner_parameters: SchemaMap::new(),
            runner_module: runner_module.into(),
        }
    }
}
