use std::any::Any;
use std::sync::Arc;
use std::time::SystemTime;

use serde_json::Value;

use crate::dispatch_context::with_execution_id;
use crate::extensions::{ExtensionRegistry, RUNNERS_NAMESPACE};
use crate::models::{
    ActionDescriptor, ActionRef, CoreError, CoreErrorKind, ExecutionId, ExecutionRecord,
    ExecutionResult, ExecutionStatus, NewExecution, ParameterMap, RunnerDescriptor,
};
use crate::orchestration::OrchestrationResult;
use crate::parameters::ParameterResolver;
use crate::persistence::{DispatchStore, PersistenceResult};
use crate::runners::{RunContext, Runner, RunnerFault};

struct DispatchOutcome {
    status: ExecutionStatus,
    result: ExecutionResult,
}

struct PreparedDispatch {
    action: ActionDescriptor,
    runner: RunnerDescriptor,
    instance: Box<dyn Runner>,
    parameters: ParameterMap,
}

#[derive(Clone)]
pub struct ExecutionDispatcher {
    registry: Arc<ExtensionRegistry>,
    store: Arc<dyn DispatchStore>,
    resolver: ParameterResolver,
}

impl ExecutionDispatcher {
    pub fn new(registry: Arc<ExtensionRegistry>, store: Arc<dyn DispatchStore>) -> Self {
        Self {
            registry,
            store,
            resolver: ParameterResolver::new(),
        }
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    /// Creates a new `initializing` record for `action` without dispatching it.
    pub async fn create_execution(
        &self,
        action: impl Into<String>,
        parameters: ParameterMap,
    ) -> OrchestrationResult<ExecutionRecord> {
        let submission = NewExecution {
            action: action.into(),
            parameters,
            requested_at: SystemTime::now(),
        };
        let store = self.store.clone();
        run_blocking("create_execution", move || store.create_execution(submission)).await
    }

    /// Runs one execution to a terminal state and returns whether it
    /// succeeded. Only `record.id` is used; the stored record is
    /// authoritative. Lookup, runner resolution and parameter failures are
    /// returned as errors and leave the record `initializing`; runner faults
    /// end the record in `failed`.
    pub async fn dispatch(&self, record: &ExecutionRecord) -> OrchestrationResult<bool> {
        self.dispatch_by_id(record.id).await
    }

    /// Dispatches the stored record with `id`. The stored status decides,
    /// so a stale caller copy of a finished record is refused.
    pub async fn dispatch_by_id(&self, id: ExecutionId) -> OrchestrationResult<bool> {
        let store = self.store.clone();
        let stored = run_blocking("execution_by_id", move || store.execution_by_id(id))
            .await?
            .ok_or_else(|| {
                CoreError::new(
                    CoreErrorKind::InvalidInput,
                    format!("unknown execution id '{}'", id.0),
                )
                .with_execution(id)
            })?;
        if stored.status != ExecutionStatus::Initializing {
            return Err(not_dispatchable(&stored));
        }
        let record = &stored;

        let prepared = match self.prepare(record).await {
            Ok(prepared) => prepared,
            Err(error) => {
                let attributed = error.attribute(None, Some(&record.action), Some(record.id));
                if attributed.is_resolution_failure() {
                    tracing::warn!(
                        execution_id = record.id.0,
                        action = %record.action,
                        kind = ?attributed.kind,
                        message = %attributed.message,
                        "dispatch aborted before running"
                    );
                } else {
                    tracing::error!(
                        execution_id = record.id.0,
                        action = %record.action,
                        kind = ?attributed.kind,
                        message = %attributed.message,
                        "dispatch preparation failed"
                    );
                }
                return Err(attributed);
            }
        };

        let runner_name = prepared.runner.name.clone();
        let mut running = record.clone();
        running.mark_running(prepared.parameters.clone())?;
        if !self.claim(&running, &runner_name).await? {
            return Err(CoreError::new(
                CoreErrorKind::InvalidTransition,
                format!("execution '{}' was dispatched concurrently", record.id.0),
            )
            .with_runner(runner_name)
            .with_action(record.action.clone())
            .with_execution(record.id));
        }
        tracing::info!(
            execution_id = running.id.0,
            action = %running.action,
            runner = %runner_name,
            "execution running"
        );

        let outcome = invoke(prepared, running.id).await;
        running.finish(outcome.status, outcome.result, SystemTime::now())?;
        self.persist(&running, &runner_name).await?;

        match &running.result {
            Some(ExecutionResult {
                error: Some(fault), ..
            }) => tracing::info!(
                execution_id = running.id.0,
                action = %running.action,
                runner = %runner_name,
                fault = %fault,
                "execution failed"
            ),
            _ => tracing::info!(
                execution_id = running.id.0,
                action = %running.action,
                runner = %runner_name,
                status = running.status.as_str(),
                "execution finished"
            ),
        }

        Ok(running.status == ExecutionStatus::Succeeded)
    }

    async fn prepare(&self, record: &ExecutionRecord) -> OrchestrationResult<PreparedDispatch> {
        let reference = ActionRef::parse(&record.action).ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::UnknownAction,
                format!("invalid action reference '{}'", record.action),
            )
        })?;

        let store = self.store.clone();
        let lookup = reference.clone();
        let action = run_blocking("action_by_ref", move || store.action_by_ref(&lookup))
            .await?
            .filter(|action| action.enabled)
            .ok_or_else(|| {
                CoreError::new(
                    CoreErrorKind::UnknownAction,
                    format!("action '{reference}' is not registered or is disabled"),
                )
            })?;

        let store = self.store.clone();
        let runner_type = action.runner_type.clone();
        let runner = run_blocking("runner_by_name", move || store.runner_by_name(&runner_type))
            .await?
            .filter(|runner| runner.enabled)
            .ok_or_else(|| {
                CoreError::new(
                    CoreErrorKind::UnknownRunner,
                    format!(
                        "runner '{}' is not registered or is disabled",
                        action.runner_type
                    ),
                )
                .with_runner(action.runner_type.clone())
            })?;

        let instance = self
            .registry
            .instantiate(RUNNERS_NAMESPACE, &runner.runner_module)
            .map_err(|error| error.attribute(Some(&runner.name), None, None))?;

        let parameters = self
            .resolver
            .resolve_for(&runner, &action, &record.parameters)
            .map_err(|error| CoreError::from(error).with_runner(runner.name.clone()))?;

        Ok(PreparedDispatch {
            action,
            runner,
            instance,
            parameters,
        })
    }

    async fn claim(&self, record: &ExecutionRecord, runner: &str) -> OrchestrationResult<bool> {
        let store = self.store.clone();
        let snapshot = record.clone();
        run_blocking("transition_execution", move || {
            store.transition_execution(&snapshot, ExecutionStatus::Initializing)
        })
        .await
        .map_err(|error| error.attribute(Some(runner), Some(&record.action), Some(record.id)))
    }

    async fn persist(&self, record: &ExecutionRecord, runner: &str) -> OrchestrationResult<()> {
        let store = self.store.clone();
        let snapshot = record.clone();
        run_blocking("upsert_execution", move || store.upsert_execution(&snapshot))
            .await
            .map_err(|error| {
                let attributed = error.attribute(Some(runner), Some(&record.action), Some(record.id));
                tracing::error!(
                    execution_id = record.id.0,
                    action = %record.action,
                    runner,
                    status = record.status.as_str(),
                    kind = ?attributed.kind,
                    message = %attributed.message,
                    "failed to persist execution record"
                );
                attributed
            })
    }
}

async fn invoke(prepared: PreparedDispatch, execution: ExecutionId) -> DispatchOutcome {
    let PreparedDispatch {
        action,
        mut instance,
        parameters,
        ..
    } = prepared;
    let context = RunContext {
        execution,
        action: action.reference().to_string(),
        entry_point: action.entry_point,
    };
    let resolved_parameters = parameters.clone();

    let joined = tokio::task::spawn_blocking(move || {
        with_execution_id(execution, || instance.run(&context, &parameters))
    })
    .await;

    let run_result = joined.unwrap_or_else(|join_error| {
        let message = if join_error.is_panic() {
            format!("runner panicked: {}", panic_message(join_error.into_panic()))
        } else {
            format!("runner task did not complete: {join_error}")
        };
        Err(RunnerFault::new(message))
    });

    match run_result {
        Ok(output) => DispatchOutcome {
            status: ExecutionStatus::Succeeded,
            result: ExecutionResult {
                resolved_parameters,
                output,
                error: None,
            },
        },
        Err(fault) => DispatchOutcome {
            status: ExecutionStatus::Failed,
            result: ExecutionResult {
                resolved_parameters,
                output: fault.payload.unwrap_or(Value::Null),
                error: Some(fault.message),
            },
        },
    }
}

async fn run_blocking<T, F>(operation: &'static str, task: F) -> OrchestrationResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> PersistenceResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task).await.map_err(|join_error| {
        CoreError::new(
            CoreErrorKind::Internal,
            format!("store operation '{operation}' join failure: {join_error}"),
        )
    })?
}

fn not_dispatchable(record: &ExecutionRecord) -> CoreError {
    CoreError::new(
        CoreErrorKind::InvalidTransition,
        format!(
            "execution '{}' is '{}' and cannot be dispatched",
            record.id.0,
            record.status.as_str()
        ),
    )
    .with_action(record.action.clone())
    .with_execution(record.id)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::panic_message;

    #[test]
    fn panic_payloads_are_rendered() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "bang");
        assert_eq!(panic_message(Box::new(7_u8)), "non-string panic payload");
    }
}
