pub mod action;
pub mod error;
pub mod execution;
pub mod parameter;
pub mod runner;

pub use action::{ActionDescriptor, ActionRef};
pub use error::{CoreError, CoreErrorKind, CoreResult};
pub use execution::{
    ExecutionId, ExecutionRecord, ExecutionResult, ExecutionStatus, NewExecution,
};
pub use parameter::{
    NullParameterValue, ParameterMap, ParameterSchema, ParameterType, ParameterValue, SchemaMap,
    parameters_to_json,
};
pub use runner::RunnerDescriptor;
