use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{CoreError, CoreErrorKind, CoreResult, ParameterMap};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ExecutionId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Initializing,
    Running,
    Succeeded,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Initializing, Self::Running)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "initializing" => Ok(Self::Initializing),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

/// Stored outcome of a finished execution. `resolved_parameters` is always the
/// exact set handed to the runner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub resolved_parameters: ParameterMap,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewExecution {
    pub action: String,
    pub parameters: ParameterMap,
    pub requested_at: SystemTime,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub action: String,
    pub parameters: ParameterMap,
    pub resolved_parameters: Option<ParameterMap>,
    pub status: ExecutionStatus,
    pub start_timestamp: SystemTime,
    pub end_timestamp: Option<SystemTime>,
    pub result: Option<ExecutionResult>,
}

impl ExecutionRecord {
    pub fn initializing(id: ExecutionId, submission: NewExecution) -> Self {
        Self {
            id,
            action: submission.action,
            parameters: submission.parameters,
            resolved_parameters: None,
            status: ExecutionStatus::Initializing,
            start_timestamp: submission.requested_at,
            end_timestamp: None,
            result: None,
        }
    }

    pub(crate) fn mark_running(&mut self, resolved_parameters: ParameterMap) -> CoreResult<()> {
        self.ensure_transition(ExecutionStatus::Running)?;
        self.status = ExecutionStatus::Running;
        self.resolved_parameters = Some(resolved_parameters);
        Ok(())
    }

    pub(crate) fn finish(
        &mut self,
        terminal: ExecutionStatus,
        result: ExecutionResult,
        finished_at: SystemTime,
    ) -> CoreResult<()> {
        if !terminal.is_terminal() {
            return Err(self.invalid_transition(terminal));
        }
        self.ensure_transition(terminal)?;
        self.status = terminal;
        self.end_timestamp = Some(finished_at);
        self.result = Some(result);
        Ok(())
    }

    fn ensure_transition(&self, desired: ExecutionStatus) -> CoreResult<()> {
        if self.status.can_transition_to(desired) {
            Ok(())
        } else {
            Err(self.invalid_transition(desired))
        }
    }

    fn invalid_transition(&self, desired: ExecutionStatus) -> CoreError {
        CoreError::new(
            CoreErrorKind::InvalidTransition,
            format!(
                "execution '{}' cannot transition from '{}' to '{}'",
                self.id.0,
                self.status.as_str(),
                desired.as_str()
            ),
        )
        .with_action(self.action.clone())
        .with_execution(self.id)
    }
}
