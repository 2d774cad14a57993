use crate::extensions::{ExtensionRegistry, RUNNERS_NAMESPACE};
use crate::models::{
    CoreResult, ParameterSchema, ParameterType, RunnerDescriptor, SchemaMap,
};
use crate::runners::{LocalShellRunner, NoopRunner, Runner};

pub const NOOP_RUNNER: &str = "noop";
pub const LOCAL_SHELL_RUNNER: &str = "local-shell";

const BUILTIN_RUNNER_MODULES: [&str; 2] = [NOOP_RUNNER, LOCAL_SHELL_RUNNER];

/// Runner types shipped with the crate, ready to be registered with a store.
pub fn runners() -> Vec<RunnerDescriptor> {
    vec![
        RunnerDescriptor {
            name: "noop".to_string(),
            description: "Returns the resolved parameters without doing any work.".to_string(),
            enabled: true,
            runner_parameters: SchemaMap::new(),
            runner_module: NOOP_RUNNER.to_string(),
        },
        RunnerDescriptor {
            name: "local-shell-cmd".to_string(),
            description: "Runs a shell command on the dispatching host.".to_string(),
            enabled: true,
            runner_parameters: SchemaMap::from([
                (
                    "cmd".to_string(),
                    ParameterSchema::new(ParameterType::String)
                        .with_description("Command line passed to the shell.")
                        .required(),
                ),
                (
                    "cwd".to_string(),
                    ParameterSchema::new(ParameterType::String)
                        .with_description("Working directory for the command."),
                ),
                (
                    "env".to_string(),
                    ParameterSchema::new(ParameterType::Object)
                        .with_description("Extra environment variables."),
                ),
            ]),
            runner_module: LOCAL_SHELL_RUNNER.to_string(),
        },
    ]
}

pub fn runner(name: &str) -> Option<RunnerDescriptor> {
    runners().into_iter().find(|descriptor| descriptor.name == name)
}

pub fn builtin_runner_modules() -> &'static [&'static str] {
    &BUILTIN_RUNNER_MODULES
}

/// Registers every built-in runner implementation under the runners namespace.
pub fn register_builtin_runners(registry: &mut ExtensionRegistry) -> CoreResult<()> {
    registry.register(RUNNERS_NAMESPACE, NOOP_RUNNER, |config| {
        Ok(Box::new(NoopRunner::from_config(config)?) as Box<dyn Runner>)
    })?;
    registry.register(RUNNERS_NAMESPACE, LOCAL_SHELL_RUNNER, |config| {
        Ok(Box::new(LocalShellRunner::from_config(config)?) as Box<dyn Runner>)
    })?;
    Ok(())
}

pub fn builtin_extensions() -> CoreResult<ExtensionRegistry> {
    let mut registry = ExtensionRegistry::new();
    register_builtin_runners(&mut registry)?;
    Ok(registry)
}
