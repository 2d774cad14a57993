use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::models::{
    ActionDescriptor, ActionRef, CoreError, CoreErrorKind, ExecutionId, ExecutionRecord,
    ExecutionStatus, NewExecution, RunnerDescriptor,
};
use crate::persistence::{ActionStore, ExecutionStore, PersistenceResult, RunnerStore};

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    next_execution_id: u64,
    runners: BTreeMap<String, RunnerDescriptor>,
    actions: BTreeMap<(String, String), ActionDescriptor>,
    executions: HashMap<ExecutionId, ExecutionRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> PersistenceResult<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::Internal, "in-memory store mutex poisoned")
        })
    }
}

impl RunnerStore for InMemoryStore {
    fn upsert_runner(&self, runner: &RunnerDescriptor) -> PersistenceResult<()> {
        let mut state = self.lock_state()?;
        state.runners.insert(runner.name.clone(), runner.clone());
        Ok(())
    }

    fn runner_by_name(&self, name: &str) -> PersistenceResult<Option<RunnerDescriptor>> {
        Ok(self.lock_state()?.runners.get(name).cloned())
    }

    fn list_runners(&self) -> PersistenceResult<Vec<RunnerDescriptor>> {
        Ok(self.lock_state()?.runners.values().cloned().collect())
    }

    fn delete_runner(&self, name: &str) -> PersistenceResult<()> {
        let mut state = self.lock_state()?;
        if let Some(action) = state.actions.values().find(|action| action.runner_type == name) {
            return Err(CoreError::new(
                CoreErrorKind::ReferenceConflict,
                format!(
                    "runner '{name}' is still referenced by action '{}'",
                    action.reference()
                ),
            )
            .with_runner(name));
        }
        state.runners.remove(name);
        Ok(())
    }
}

impl ActionStore for InMemoryStore {
    fn upsert_action(&self, action: &ActionDescriptor) -> PersistenceResult<()> {
        let mut state = self.lock_state()?;
        if !state.runners.contains_key(&action.runner_type) {
            return Err(CoreError::new(
                CoreErrorKind::ReferenceConflict,
                format!("runner '{}' does not exist", action.runner_type),
            )
            .with_action(action.reference().to_string()));
        }
        state
            .actions
            .insert((action.pack.clone(), action.name.clone()), action.clone());
        Ok(())
    }

    fn action_by_ref(&self, reference: &ActionRef) -> PersistenceResult<Option<ActionDescriptor>> {
        let state = self.lock_state()?;
        let mut matches = state
            .actions
            .values()
            .filter(|action| reference.matches(action));
        let first = matches.next().cloned();
        if matches.next().is_some() {
            return Err(ambiguous_reference(reference));
        }
        Ok(first)
    }

    fn list_actions(&self) -> PersistenceResult<Vec<ActionDescriptor>> {
        Ok(self.lock_state()?.actions.values().cloned().collect())
    }
}

impl ExecutionStore for InMemoryStore {
    fn create_execution(&self, submission: NewExecution) -> PersistenceResult<ExecutionRecord> {
        let mut state = self.lock_state()?;
        state.next_execution_id = state.next_execution_id.saturating_add(1);
        let record = ExecutionRecord::initializing(ExecutionId(state.next_execution_id), submission);
        state.executions.insert(record.id, record.clone());
        Ok(record)
    }

    fn upsert_execution(&self, record: &ExecutionRecord) -> PersistenceResult<()> {
        let mut state = self.lock_state()?;
        state.next_execution_id = state.next_execution_id.max(record.id.0);
        state.executions.insert(record.id, record.clone());
        Ok(())
    }

    fn transition_execution(
        &self,
        record: &ExecutionRecord,
        expected: ExecutionStatus,
    ) -> PersistenceResult<bool> {
        let mut state = self.lock_state()?;
        match state.executions.get_mut(&record.id) {
            Some(stored) if stored.status == expected => {
                *stored = record.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn execution_by_id(&self, id: ExecutionId) -> PersistenceResult<Option<ExecutionRecord>> {
        Ok(self.lock_state()?.executions.get(&id).cloned())
    }

    fn list_recent_executions(&self, limit: usize) -> PersistenceResult<Vec<ExecutionRecord>> {
        let state = self.lock_state()?;
        let mut records: Vec<ExecutionRecord> = state.executions.values().cloned().collect();
        records.sort_by(|left, right| right.id.cmp(&left.id));
        records.truncate(limit);
        Ok(records)
    }
}

pub(crate) fn ambiguous_reference(reference: &ActionRef) -> CoreError {
    CoreError::new(
        CoreErrorKind::AmbiguousLookup,
        format!("action reference '{reference}' matches actions in more than one pack"),
    )
    .with_action(reference.to_string())
}
