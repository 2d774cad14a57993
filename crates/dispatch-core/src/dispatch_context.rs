use std::cell::Cell;

use crate::models::ExecutionId;

thread_local! {
    static CURRENT_EXECUTION_ID: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Execution currently being run on this thread, if any.
pub fn current_execution_id() -> Option<ExecutionId> {
    CURRENT_EXECUTION_ID.with(|slot| slot.get().map(ExecutionId))
}

pub(crate) fn with_execution_id<R>(execution: ExecutionId, operation: impl FnOnce() -> R) -> R {
    let _restore = RestoreOnDrop(CURRENT_EXECUTION_ID.with(|slot| slot.replace(Some(execution.0))));
    operation()
}

// Restores the previous id even when a runner unwinds.
struct RestoreOnDrop(Option<u64>);

impl Drop for RestoreOnDrop {
    fn drop(&mut self) {
        CURRENT_EXECUTION_ID.with(|slot| slot.set(self.0));
    }
}
