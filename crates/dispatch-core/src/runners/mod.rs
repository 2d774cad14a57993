pub mod local_shell;
pub mod noop;

use serde_json::Value;
use thiserror::Error;

use crate::models::{ExecutionId, ParameterMap};

pub use local_shell::LocalShellRunner;
pub use noop::NoopRunner;

pub type RunnerResult = Result<Value, RunnerFault>;

/// Failure reported by a runner while executing. Never surfaces as a dispatch
/// error; the dispatcher records it on the execution instead.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("{message}")]
pub struct RunnerFault {
    pub message: String,
    pub payload: Option<Value>,
}

impl RunnerFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunContext {
    pub execution: ExecutionId,
    pub action: String,
    pub entry_point: String,
}

/// Execution backend contract. Instances are built fresh for every dispatch
/// and are only ever driven from one thread at a time.
pub trait Runner: Send {
    fn run(&mut self, context: &RunContext, parameters: &ParameterMap) -> RunnerResult;
}
