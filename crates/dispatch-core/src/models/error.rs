use thiserror::Error;

use crate::models::ExecutionId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    UnknownExtension,
    ConfigParse,
    MissingRequiredParameter,
    ParameterType,
    UnknownAction,
    UnknownRunner,
    AmbiguousLookup,
    InvalidInput,
    InvalidTransition,
    ReferenceConflict,
    StorageFailure,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub runner: Option<String>,
    pub action: Option<String>,
    pub execution: Option<ExecutionId>,
    pub kind: CoreErrorKind,
    pub message: String,
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            runner: None,
            action: None,
            execution: None,
            kind,
            message: message.into(),
        }
    }

    pub fn with_runner(mut self, runner: impl Into<String>) -> Self {
        self.runner = Some(runner.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_execution(mut self, execution: ExecutionId) -> Self {
        self.execution = Some(execution);
        self
    }

    /// Fills attribution fields that are still empty, keeping anything the
    /// originating layer already recorded.
    pub fn attribute(
        self,
        runner: Option<&str>,
        action: Option<&str>,
        execution: Option<ExecutionId>,
    ) -> Self {
        Self {
            runner: self.runner.or_else(|| runner.map(str::to_string)),
            action: self.action.or_else(|| action.map(str::to_string)),
            execution: self.execution.or(execution),
            kind: self.kind,
            message: self.message,
        }
    }

    /// True for faults raised while preparing a dispatch, before any runner
    /// was invoked.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self.kind,
            CoreErrorKind::UnknownExtension
                | CoreErrorKind::ConfigParse
                | CoreErrorKind::MissingRequiredParameter
                | CoreErrorKind::ParameterType
                | CoreErrorKind::UnknownAction
                | CoreErrorKind::UnknownRunner
                | CoreErrorKind::AmbiguousLookup
        )
    }
}
