pub mod dispatcher;

pub use dispatcher::ExecutionDispatcher;

use crate::models::CoreError;

pub type OrchestrationResult<T> = Result<T, CoreError>;
