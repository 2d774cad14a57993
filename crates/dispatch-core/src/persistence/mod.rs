pub mod in_memory;

pub use in_memory::InMemoryStore;

use crate::models::{
    ActionDescriptor, ActionRef, CoreError, ExecutionId, ExecutionRecord, ExecutionStatus,
    NewExecution, RunnerDescriptor,
};

pub type PersistenceResult<T> = Result<T, CoreError>;

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

pub trait RunnerStore: Send + Sync {
    fn upsert_runner(&self, runner: &RunnerDescriptor) -> PersistenceResult<()>;

    fn runner_by_name(&self, name: &str) -> PersistenceResult<Option<RunnerDescriptor>>;

    fn list_runners(&self) -> PersistenceResult<Vec<RunnerDescriptor>>;

    /// Fails with `ReferenceConflict` while any action still names the runner.
    fn delete_runner(&self, name: &str) -> PersistenceResult<()>;
}

pub trait ActionStore: Send + Sync {
    fn upsert_action(&self, action: &ActionDescriptor) -> PersistenceResult<()>;

    /// `None` when nothing matches; `AmbiguousLookup` when a bare name matches
    /// actions in more than one pack.
    fn action_by_ref(&self, reference: &ActionRef) -> PersistenceResult<Option<ActionDescriptor>>;

    fn list_actions(&self) -> PersistenceResult<Vec<ActionDescriptor>>;
}

pub trait ExecutionStore: Send + Sync {
    fn create_execution(&self, submission: NewExecution) -> PersistenceResult<ExecutionRecord>;

    fn upsert_execution(&self, record: &ExecutionRecord) -> PersistenceResult<()>;

    /// Replaces the stored record only while its status is still `expected`.
    /// Returns false, writing nothing, when the stored status differs or the
    /// record is absent.
    fn transition_execution(
        &self,
        record: &ExecutionRecord,
        expected: ExecutionStatus,
    ) -> PersistenceResult<bool>;

    fn execution_by_id(&self, id: ExecutionId) -> PersistenceResult<Option<ExecutionRecord>>;

    fn list_recent_executions(&self, limit: usize) -> PersistenceResult<Vec<ExecutionRecord>>;
}

pub trait DispatchStore: RunnerStore + ActionStore + ExecutionStore {}

impl<T: RunnerStore + ActionStore + ExecutionStore> DispatchStore for T {}
