use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::Deserialize;
use serde_json::json;

use crate::config::RunnerConfig;
use crate::dispatch_context::current_execution_id;
use crate::models::{CoreResult, ParameterMap, ParameterValue};
use crate::runners::{RunContext, Runner, RunnerFault, RunnerResult};

const DEFAULT_SHELL: &str = "sh";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LocalShellSettings {
    #[serde(default = "default_shell")]
    shell: PathBuf,
    #[serde(default)]
    working_dir: Option<PathBuf>,
}

fn default_shell() -> PathBuf {
    PathBuf::from(DEFAULT_SHELL)
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct ShellCommand {
    script: String,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl ShellCommand {
    fn from_parameters(
        parameters: &ParameterMap,
        default_dir: Option<&PathBuf>,
    ) -> Result<Self, RunnerFault> {
        let script = match parameters.get("cmd") {
            Some(ParameterValue::String(script)) if !script.trim().is_empty() => script.clone(),
            Some(ParameterValue::String(_)) | None => {
                return Err(RunnerFault::new("parameter 'cmd' must be a non-empty string"));
            }
            Some(other) => {
                return Err(RunnerFault::new(format!(
                    "parameter 'cmd' must be a string, got {}",
                    other.kind()
                )));
            }
        };

        let mut env = BTreeMap::new();
        if let Some(value) = parameters.get("env") {
            let entries = value
                .as_object()
                .ok_or_else(|| RunnerFault::new("parameter 'env' must be an object"))?;
            for (key, value) in entries {
                let value = value.as_str().ok_or_else(|| {
                    RunnerFault::new(format!("environment value for '{key}' must be a string"))
                })?;
                env.insert(key.clone(), value.to_string());
            }
        }

        let working_dir = match parameters.get("cwd") {
            Some(ParameterValue::String(dir)) => Some(PathBuf::from(dir)),
            Some(other) => {
                return Err(RunnerFault::new(format!(
                    "parameter 'cwd' must be a string, got {}",
                    other.kind()
                )));
            }
            None => default_dir.cloned(),
        };

        let command = Self {
            script,
            env,
            working_dir,
        };
        command.validate()?;
        Ok(command)
    }

    fn validate(&self) -> Result<(), RunnerFault> {
        if self.script.contains('\0') {
            return Err(RunnerFault::new("command must not contain NUL bytes"));
        }

        if self
            .env
            .iter()
            .any(|(key, value)| key.is_empty() || key.contains('\0') || value.contains('\0'))
        {
            return Err(RunnerFault::new(
                "environment keys and values must be non-empty and must not contain NUL bytes",
            ));
        }

        Ok(())
    }
}

/// Runs the `cmd` parameter through a local shell. Exit code zero is success.
#[derive(Debug)]
pub struct LocalShellRunner {
    shell: PathBuf,
    working_dir: Option<PathBuf>,
}

impl LocalShellRunner {
    pub fn from_config(config: &RunnerConfig) -> CoreResult<Self> {
        let settings: LocalShellSettings = config.decode()?;
        Ok(Self {
            shell: settings.shell,
            working_dir: settings.working_dir,
        })
    }
}

impl Runner for LocalShellRunner {
    fn run(&mut self, context: &RunContext, parameters: &ParameterMap) -> RunnerResult {
        let command = ShellCommand::from_parameters(parameters, self.working_dir.as_ref())?;

        let mut process = Command::new(&self.shell);
        process.arg("-c").arg(&command.script);
        process.envs(&command.env);
        if let Some(dir) = &command.working_dir {
            process.current_dir(dir);
        }
        process.stdin(Stdio::null());

        tracing::debug!(
            execution_id = current_execution_id().map(|id| id.0),
            action = %context.action,
            shell = %self.shell.display(),
            "spawning local shell command"
        );

        let output = process.output().map_err(|error| {
            RunnerFault::new(format!(
                "failed to spawn '{}': {error}",
                self.shell.display()
            ))
        })?;

        let payload = json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "exit_code": output.status.code(),
        });

        if output.status.success() {
            Ok(payload)
        } else {
            let status = output
                .status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string());
            Err(RunnerFault::new(format!("command exited with status {status}"))
                .with_payload(payload))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::LocalShellRunner;
    use crate::config::RunnerConfig;
    use crate::models::{CoreErrorKind, ExecutionId, ParameterMap, ParameterValue};
    use crate::runners::{RunContext, Runner};

    fn context() -> RunContext {
        RunContext {
            execution: ExecutionId(3),
            action: "core.local".to_string(),
            entry_point: String::new(),
        }
    }

    fn parameters(cmd: &str) -> ParameterMap {
        let mut parameters = ParameterMap::new();
        parameters.insert("cmd".to_string(), ParameterValue::from(cmd));
        parameters
    }

    #[test]
    fn missing_command_is_a_fault() {
        let mut runner = LocalShellRunner::from_config(&RunnerConfig::new()).unwrap();
        let fault = runner.run(&context(), &ParameterMap::new()).unwrap_err();
        assert!(fault.message.contains("cmd"));
    }

    #[test]
    fn nul_bytes_are_rejected_before_spawning() {
        let mut runner = LocalShellRunner::from_config(&RunnerConfig::new()).unwrap();
        let fault = runner.run(&context(), &parameters("echo \0")).unwrap_err();
        assert!(fault.message.contains("NUL"));
    }

    #[test]
    fn unknown_settings_are_config_errors() {
        let config = RunnerConfig::parse(Some(r#"{"shel": "/bin/sh"}"#)).unwrap();
        let error = LocalShellRunner::from_config(&config).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::ConfigParse);
    }

    #[cfg(unix)]
    #[test]
    fn captures_stdout_and_environment() {
        let mut runner = LocalShellRunner::from_config(&RunnerConfig::new()).unwrap();
        let mut parameters = parameters("echo \"$GREETING\"");
        let mut env = BTreeMap::new();
        env.insert("GREETING".to_string(), ParameterValue::from("hello"));
        parameters.insert("env".to_string(), ParameterValue::Object(env));

        let payload = runner.run(&context(), &parameters).unwrap();
        assert_eq!(payload["stdout"], json!("hello\n"));
        assert_eq!(payload["exit_code"], json!(0));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_a_fault_with_output() {
        let mut runner = LocalShellRunner::from_config(&RunnerConfig::new()).unwrap();
        let fault = runner
            .run(&context(), &parameters("echo oops >&2; exit 3"))
            .unwrap_err();
        assert_eq!(fault.message, "command exited with status 3");
        let payload = fault.payload.unwrap();
        assert_eq!(payload["exit_code"], json!(3));
        assert_eq!(payload["stderr"], json!("oops\n"));
    }
}
