use std::collections::BTreeSet;

use dispatch_core::models::{
    ActionDescriptor, CoreError, CoreErrorKind, ParameterMap, ParameterSchema, ParameterType,
    ParameterValue, RunnerDescriptor, SchemaMap,
};
use dispatch_core::parameters::{ParameterError, ParameterResolver};

fn schema(entries: Vec<(&str, ParameterSchema)>) -> SchemaMap {
    entries
        .into_iter()
        .map(|(name, schema)| (name.to_string(), schema))
        .collect()
}

fn values(entries: Vec<(&str, ParameterValue)>) -> ParameterMap {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

fn required(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[test]
fn layers_apply_in_precedence_order() {
    let runner = schema(vec![
        ("a", ParameterSchema::new(ParameterType::String).with_default("runner")),
        ("b", ParameterSchema::new(ParameterType::String).with_default("runner")),
        ("c", ParameterSchema::new(ParameterType::String).with_default("runner")),
    ]);
    let action = schema(vec![
        ("b", ParameterSchema::new(ParameterType::String).with_default("action")),
        ("c", ParameterSchema::new(ParameterType::String).with_default("action")),
    ]);
    let supplied = values(vec![("c", "caller".into())]);

    let resolved = ParameterResolver::new()
        .resolve(&runner, &action, &BTreeSet::new(), &supplied)
        .unwrap();

    assert_eq!(
        resolved,
        values(vec![
            ("a", "runner".into()),
            ("b", "action".into()),
            ("c", "caller".into()),
        ])
    );
}

#[test]
fn action_declaration_shadows_runner_declaration_entirely() {
    let runner = schema(vec![(
        "timeout",
        ParameterSchema::new(ParameterType::Number).with_default(60_i64),
    )]);
    let action = schema(vec![("timeout", ParameterSchema::new(ParameterType::String))]);

    let resolver = ParameterResolver::new();
    let resolved = resolver
        .resolve(&runner, &action, &BTreeSet::new(), &ParameterMap::new())
        .unwrap();
    assert!(resolved.is_empty());

    let error = resolver
        .resolve(
            &runner,
            &action,
            &BTreeSet::new(),
            &values(vec![("timeout", 30_i64.into())]),
        )
        .unwrap_err();
    assert_eq!(
        error,
        ParameterError::TypeMismatch {
            name: "timeout".to_string(),
            expected: ParameterType::String,
            actual: ParameterType::Number,
        }
    );
}

#[test]
fn missing_names_are_listed_together_in_order() {
    let action = schema(vec![
        ("zeta", ParameterSchema::new(ParameterType::String)),
        ("alpha", ParameterSchema::new(ParameterType::String)),
        ("beta", ParameterSchema::new(ParameterType::String).with_default("set")),
    ]);

    let error = ParameterResolver::new()
        .resolve(
            &SchemaMap::new(),
            &action,
            &required(&["zeta", "alpha", "beta"]),
            &ParameterMap::new(),
        )
        .unwrap_err();

    assert_eq!(
        error,
        ParameterError::MissingRequired {
            names: vec!["alpha".to_string(), "zeta".to_string()],
        }
    );
    let core: CoreError = error.into();
    assert_eq!(core.kind, CoreErrorKind::MissingRequiredParameter);
    assert_eq!(core.message, "missing required parameters: alpha, zeta");
}

#[test]
fn type_errors_win_over_missing_parameters() {
    let action = schema(vec![
        ("count", ParameterSchema::new(ParameterType::Number)),
        ("label", ParameterSchema::new(ParameterType::String)),
    ]);

    let error = ParameterResolver::new()
        .resolve(
            &SchemaMap::new(),
            &action,
            &required(&["label"]),
            &values(vec![("count", "three".into())]),
        )
        .unwrap_err();

    let core = CoreError::from(error);
    assert_eq!(core.kind, CoreErrorKind::ParameterType);
    assert_eq!(core.message, "parameter 'count' expects number but got string");
}

#[test]
fn resolution_is_idempotent_and_leaves_inputs_untouched() {
    let mut runner = RunnerDescriptor::new("python", "python");
    runner.runner_parameters = schema(vec![(
        "interpreter",
        ParameterSchema::new(ParameterType::String).with_default("python3"),
    )]);
    let mut action = ActionDescriptor::new("core", "script", "python");
    action.parameters = schema(vec![
        ("args", ParameterSchema::new(ParameterType::Array)),
        ("verbose", ParameterSchema::new(ParameterType::Boolean).with_default(false)),
    ]);
    action.required_parameters = required(&["args"]);
    let supplied = values(vec![(
        "args",
        ParameterValue::from(vec![ParameterValue::from("--dry-run")]),
    )]);
    let snapshot = (runner.clone(), action.clone(), supplied.clone());

    let resolver = ParameterResolver::new();
    let first = resolver.resolve_for(&runner, &action, &supplied).unwrap();
    let second = resolver.resolve_for(&runner, &action, &supplied).unwrap();

    assert_eq!(first, second);
    assert_eq!(first["interpreter"], ParameterValue::from("python3"));
    assert_eq!(first["verbose"], ParameterValue::from(false));
    assert_eq!((runner, action, supplied), snapshot);
}

#[test]
fn caller_value_satisfies_required_without_any_default() {
    let action = schema(vec![("target", ParameterSchema::new(ParameterType::Object).required())]);
    let target: ParameterValue =
        serde_json::from_value(serde_json::json!({"host": "db-1", "port": 5432})).unwrap();

    let resolved = ParameterResolver::new()
        .resolve(
            &SchemaMap::new(),
            &action,
            &BTreeSet::new(),
            &values(vec![("target", target.clone())]),
        )
        .unwrap();

    assert_eq!(resolved, values(vec![("target", target)]));
}

#[test]
fn redeclared_parameter_without_default_drops_runner_default() {
    let runner = schema(vec![(
        "runnerstr",
        ParameterSchema::new(ParameterType::String).with_default("defaultfoo"),
    )]);
    let action = schema(vec![("runnerstr", ParameterSchema::new(ParameterType::String))]);

    let resolver = ParameterResolver::new();
    let resolved = resolver
        .resolve(&runner, &action, &BTreeSet::new(), &ParameterMap::new())
        .unwrap();
    assert!(!resolved.contains_key("runnerstr"));

    let error = resolver
        .resolve(&runner, &action, &required(&["runnerstr"]), &ParameterMap::new())
        .unwrap_err();
    assert_eq!(
        error,
        ParameterError::MissingRequired {
            names: vec!["runnerstr".to_string()],
        }
    );
}
