use serde::Deserialize;
use serde_json::json;

use crate::config::RunnerConfig;
use crate::models::{CoreResult, ParameterMap, parameters_to_json};
use crate::runners::{RunContext, Runner, RunnerResult};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoopSettings {}

/// Echoes the parameters it was handed back as its payload.
#[derive(Debug, Default)]
pub struct NoopRunner;

impl NoopRunner {
    pub fn from_config(config: &RunnerConfig) -> CoreResult<Self> {
        let _: NoopSettings = config.decode()?;
        Ok(Self)
    }
}

impl Runner for NoopRunner {
    fn run(&mut self, context: &RunContext, parameters: &ParameterMap) -> RunnerResult {
        tracing::debug!(
            execution_id = context.execution.0,
            action = %context.action,
            "noop runner invoked"
        );
        Ok(json!({
            "action": context.action,
            "parameters": parameters_to_json(parameters),
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::NoopRunner;
    use crate::config::RunnerConfig;
    use crate::models::{CoreErrorKind, ExecutionId, ParameterMap, ParameterValue};
    use crate::runners::{RunContext, Runner};

    #[test]
    fn echoes_parameters() {
        let mut runner = NoopRunner::from_config(&RunnerConfig::new()).unwrap();
        let mut parameters = ParameterMap::new();
        parameters.insert("greeting".to_string(), ParameterValue::from("hi"));

        let payload = runner
            .run(
                &RunContext {
                    execution: ExecutionId(1),
                    action: "core.noop".to_string(),
                    entry_point: String::new(),
                },
                &parameters,
            )
            .unwrap();

        assert_eq!(payload["parameters"], json!({"greeting": "hi"}));
        assert_eq!(payload["action"], json!("core.noop"));
    }

    #[test]
    fn rejects_unknown_settings() {
        let config = RunnerConfig::parse(Some(r#"{"verbose": true}"#)).unwrap();
        let error = NoopRunner::from_config(&config).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::ConfigParse);
    }
}
