use crate::models::{
    ActionDescriptor, ActionRef, CoreError, CoreErrorKind, CoreResult, RunnerDescriptor,
    SchemaMap,
};
use crate::parameters::effective_schema;
use crate::persistence::{ActionStore, RunnerStore};

/// Validates and stores a runner type. Declared defaults must match their
/// declared types; resolution relies on that.
pub fn register_runner<S>(store: &S, runner: &RunnerDescriptor) -> CoreResult<()>
where
    S: RunnerStore + ?Sized,
{
    if runner.name.trim().is_empty() || runner.runner_module.trim().is_empty() {
        return Err(CoreError::new(
            CoreErrorKind::InvalidInput,
            "runner name and runner_module must not be empty",
        ));
    }
    validate_defaults(&runner.runner_parameters)
        .map_err(|error| error.with_runner(runner.name.clone()))?;

    store.upsert_runner(runner)?;
    tracing::info!(runner = %runner.name, module = %runner.runner_module, "registered runner type");
    Ok(())
}

/// Validates and stores an action. The runner must already exist, and every
/// required parameter has to be declared by the runner or the action.
pub fn register_action<S>(store: &S, action: &ActionDescriptor) -> CoreResult<()>
where
    S: RunnerStore + ActionStore + ?Sized,
{
    let reference = action.reference().to_string();
    if ActionRef::parse(&reference).as_ref() != Some(&action.reference()) {
        return Err(CoreError::new(
            CoreErrorKind::InvalidInput,
            format!("invalid action reference '{reference}'"),
        ));
    }

    let runner = store.runner_by_name(&action.runner_type)?.ok_or_else(|| {
        CoreError::new(
            CoreErrorKind::UnknownRunner,
            format!("runner '{}' is not registered", action.runner_type),
        )
        .with_runner(action.runner_type.clone())
        .with_action(reference.clone())
    })?;

    validate_defaults(&action.parameters).map_err(|error| error.with_action(reference.clone()))?;

    let declared = effective_schema(&runner.runner_parameters, &action.parameters);
    let undeclared: Vec<&str> = action
        .required_parameters
        .iter()
        .map(String::as_str)
        .filter(|name| !declared.contains_key(name))
        .collect();
    if !undeclared.is_empty() {
        return Err(CoreError::new(
            CoreErrorKind::InvalidInput,
            format!(
                "required parameters are not declared by runner or action: {}",
                undeclared.join(", ")
            ),
        )
        .with_action(reference));
    }

    store.upsert_action(action)?;
    tracing::info!(action = %reference, runner = %action.runner_type, "registered action");
    Ok(())
}

fn validate_defaults(schema: &SchemaMap) -> CoreResult<()> {
    for (name, parameter) in schema {
        if let Some(default) = &parameter.default {
            if !parameter.accepts(default) {
                return Err(CoreError::new(
                    CoreErrorKind::ParameterType,
                    format!(
                        "default for parameter '{name}' is {} but the declared type is {}",
                        default.kind(),
                        parameter.param_type
                    ),
                ));
            }
        }
    }
    Ok(())
}
