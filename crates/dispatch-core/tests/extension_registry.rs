use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dispatch_core::config::{StaticConfigSource, kwargs_key};
use dispatch_core::extensions::RUNNERS_NAMESPACE;
use dispatch_core::models::{CoreErrorKind, ExecutionId, ParameterMap, ParameterValue};
use dispatch_core::persistence::{ExecutionStore, InMemoryStore};
use dispatch_core::registry::{self, LOCAL_SHELL_RUNNER, NOOP_RUNNER};
use dispatch_core::runners::RunContext;
use serde_json::json;

#[test]
fn unknown_names_fail_without_touching_executions() {
    let store = InMemoryStore::new();
    let registry = registry::builtin_extensions().unwrap();

    let error = registry
        .instantiate(RUNNERS_NAMESPACE, "does-not-exist")
        .err()
        .unwrap();
    assert_eq!(error.kind, CoreErrorKind::UnknownExtension);
    assert_eq!(error.runner.as_deref(), Some("does-not-exist"));
    assert!(store.list_recent_executions(10).unwrap().is_empty());
}

#[test]
fn lookups_use_the_exact_name() {
    let registry = registry::builtin_extensions().unwrap();

    assert!(registry.contains(RUNNERS_NAMESPACE, NOOP_RUNNER));
    assert!(!registry.contains(RUNNERS_NAMESPACE, "NOOP"));
    assert!(!registry.contains(RUNNERS_NAMESPACE, "noop "));
    assert!(!registry.contains("dispatch.sensors", NOOP_RUNNER));
    assert!(registry.list_available("dispatch.sensors").is_empty());
}

#[cfg(unix)]
#[test]
fn configured_constructor_arguments_reach_the_runner() {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos();
    let workdir = std::env::temp_dir().join(format!("dispatch-workdir-{nanos}"));
    std::fs::create_dir_all(&workdir).unwrap();
    let workdir = workdir.canonicalize().unwrap();

    let settings = json!({"shell": "/bin/sh", "working_dir": workdir});
    let source = StaticConfigSource::new().with(
        kwargs_key(RUNNERS_NAMESPACE, LOCAL_SHELL_RUNNER),
        settings.to_string(),
    );
    let registry = registry::builtin_extensions()
        .unwrap()
        .with_config_source(Arc::new(source));

    let mut runner = registry
        .instantiate(RUNNERS_NAMESPACE, LOCAL_SHELL_RUNNER)
        .unwrap();
    let context = RunContext {
        execution: ExecutionId(7),
        action: "core.pwd".to_string(),
        entry_point: String::new(),
    };
    let parameters = ParameterMap::from([("cmd".to_string(), ParameterValue::from("pwd -P"))]);
    let output = runner.run(&context, &parameters).unwrap();

    assert_eq!(
        output["stdout"],
        json!(format!("{}\n", workdir.display()))
    );

    let _ = std::fs::remove_dir_all(workdir);
}

#[test]
fn malformed_configuration_is_a_config_error() {
    let source = StaticConfigSource::new()
        .with(kwargs_key(RUNNERS_NAMESPACE, NOOP_RUNNER), "{not json");
    let registry = registry::builtin_extensions()
        .unwrap()
        .with_config_source(Arc::new(source));

    let error = registry
        .instantiate(RUNNERS_NAMESPACE, NOOP_RUNNER)
        .err()
        .unwrap();
    assert_eq!(error.kind, CoreErrorKind::ConfigParse);
    assert_eq!(error.runner.as_deref(), Some(NOOP_RUNNER));
}

#[test]
fn every_resolve_builds_a_fresh_instance() {
    let registry = registry::builtin_extensions().unwrap();
    let context = RunContext {
        execution: ExecutionId(1),
        action: "core.noop".to_string(),
        entry_point: String::new(),
    };

    let mut first = registry.instantiate(RUNNERS_NAMESPACE, NOOP_RUNNER).unwrap();
    let mut second = registry.instantiate(RUNNERS_NAMESPACE, NOOP_RUNNER).unwrap();
    let first_output = first.run(&context, &ParameterMap::new()).unwrap();
    let second_output = second.run(&context, &ParameterMap::new()).unwrap();

    assert_eq!(first_output, second_output);
    assert_eq!(first_output["parameters"], json!({}));
}
