use std::collections::BTreeSet;

use thiserror::Error;

use crate::models::{
    ActionDescriptor, CoreError, CoreErrorKind, ParameterMap, ParameterSchema, ParameterType,
    RunnerDescriptor, SchemaMap,
};

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ParameterError {
    #[error("missing required parameters: {}", .names.join(", "))]
    MissingRequired { names: Vec<String> },
    #[error("parameter '{name}' expects {expected} but got {actual}")]
    TypeMismatch {
        name: String,
        expected: ParameterType,
        actual: ParameterType,
    },
}

impl From<ParameterError> for CoreError {
    fn from(error: ParameterError) -> Self {
        let kind = match &error {
            ParameterError::MissingRequired { .. } => CoreErrorKind::MissingRequiredParameter,
            ParameterError::TypeMismatch { .. } => CoreErrorKind::ParameterType,
        };
        CoreError::new(kind, error.to_string())
    }
}

/// Layered parameter merge: runner defaults, then action defaults, then the
/// caller's values. Holds no state between calls.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParameterResolver;

impl ParameterResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve_for(
        &self,
        runner: &RunnerDescriptor,
        action: &ActionDescriptor,
        supplied: &ParameterMap,
    ) -> Result<ParameterMap, ParameterError> {
        self.resolve(
            &runner.runner_parameters,
            &action.parameters,
            &action.required_parameters,
            supplied,
        )
    }

    pub fn resolve(
        &self,
        runner_schema: &SchemaMap,
        action_schema: &SchemaMap,
        required: &BTreeSet<String>,
        supplied: &ParameterMap,
    ) -> Result<ParameterMap, ParameterError> {
        let effective = effective_schema(runner_schema, action_schema);

        for (name, value) in supplied {
            if let Some(schema) = effective.get(name.as_str()) {
                if !schema.accepts(value) {
                    return Err(ParameterError::TypeMismatch {
                        name: name.clone(),
                        expected: schema.param_type,
                        actual: value.kind(),
                    });
                }
            }
        }

        let mut resolved = ParameterMap::new();
        for (name, schema) in &effective {
            if let Some(default) = &schema.default {
                resolved.insert((*name).to_string(), default.clone());
            }
        }
        // Undeclared caller values are passed through as-is.
        for (name, value) in supplied {
            resolved.insert(name.clone(), value.clone());
        }

        let missing: Vec<String> = required
            .iter()
            .map(String::as_str)
            .chain(
                effective
                    .iter()
                    .filter(|(_, schema)| schema.required)
                    .map(|(name, _)| *name),
            )
            .filter(|name| !resolved.contains_key(*name))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();

        if !missing.is_empty() {
            return Err(ParameterError::MissingRequired { names: missing });
        }

        Ok(resolved)
    }
}

/// Union of both schemas; an action declaration replaces the runner's
/// declaration of the same name wholesale.
pub fn effective_schema<'a>(
    runner_schema: &'a SchemaMap,
    action_schema: &'a SchemaMap,
) -> std::collections::BTreeMap<&'a str, &'a ParameterSchema> {
    runner_schema
        .iter()
        .chain(action_schema.iter())
        .map(|(name, schema)| (name.as_str(), schema))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{ParameterError, ParameterResolver, effective_schema};
    use crate::models::{
        CoreError, CoreErrorKind, ParameterMap, ParameterSchema, ParameterType, ParameterValue,
        SchemaMap,
    };

    fn schema(entries: &[(&str, ParameterSchema)]) -> SchemaMap {
        entries
            .iter()
            .map(|(name, schema)| (name.to_string(), schema.clone()))
            .collect()
    }

    fn values(entries: &[(&str, ParameterValue)]) -> ParameterMap {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn required(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn action_declaration_shadows_runner_declaration_entirely() {
        let runner = schema(&[(
            "timeout",
            ParameterSchema::new(ParameterType::Number).with_default(60),
        )]);
        let action = schema(&[("timeout", ParameterSchema::new(ParameterType::String))]);

        let effective = effective_schema(&runner, &action);
        assert_eq!(effective["timeout"].param_type, ParameterType::String);
        assert_eq!(effective["timeout"].default, None);

        let resolved = ParameterResolver::new()
            .resolve(&runner, &action, &BTreeSet::new(), &ParameterMap::new())
            .unwrap();
        assert!(!resolved.contains_key("timeout"));
    }

    #[test]
    fn type_mismatch_names_parameter_and_types() {
        let action = schema(&[("count", ParameterSchema::new(ParameterType::Number))]);
        let error = ParameterResolver::new()
            .resolve(
                &SchemaMap::new(),
                &action,
                &BTreeSet::new(),
                &values(&[("count", ParameterValue::from("3"))]),
            )
            .unwrap_err();

        assert_eq!(
            error,
            ParameterError::TypeMismatch {
                name: "count".to_string(),
                expected: ParameterType::Number,
                actual: ParameterType::String,
            }
        );
        assert_eq!(error.to_string(), "parameter 'count' expects number but got string");
        assert_eq!(CoreError::from(error).kind, CoreErrorKind::ParameterType);
    }

    #[test]
    fn schema_required_flag_counts_as_required() {
        let runner = schema(&[(
            "host",
            ParameterSchema::new(ParameterType::String).required(),
        )]);
        let error = ParameterResolver::new()
            .resolve(&runner, &SchemaMap::new(), &required(&["cmd"]), &ParameterMap::new())
            .unwrap_err();

        assert_eq!(
            error,
            ParameterError::MissingRequired {
                names: vec!["cmd".to_string(), "host".to_string()],
            }
        );
        assert_eq!(error.to_string(), "missing required parameters: cmd, host");
    }

    #[test]
    fn defaults_are_not_type_checked() {
        let action = schema(&[(
            "count",
            ParameterSchema::new(ParameterType::Number).with_default("many"),
        )]);
        let resolved = ParameterResolver::new()
            .resolve(&SchemaMap::new(), &action, &BTreeSet::new(), &ParameterMap::new())
            .unwrap();
        assert_eq!(resolved["count"], ParameterValue::from("many"));
    }

    #[test]
    fn undeclared_values_pass_through() {
        let resolved = ParameterResolver::new()
            .resolve(
                &SchemaMap::new(),
                &SchemaMap::new(),
                &BTreeSet::new(),
                &values(&[("extra", ParameterValue::from(true))]),
            )
            .unwrap();
        assert_eq!(resolved["extra"], ParameterValue::from(true));
    }
}
