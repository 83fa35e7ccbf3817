//! Stage-folder task storage.
//!
//! A task's stage is the folder its file lives in; changing stage is a move.
//! [`FolderTaskStore`] works on a real vault, [`MemoryTaskStore`] backs tests.

pub mod folder;
pub mod memory;
pub mod state_machine;

pub use folder::{FolderTaskStore, VaultLayout};
pub use memory::MemoryTaskStore;
pub use state_machine::{validate_transition, TaskState};

use crate::codec::{self, TaskRecord};
use crate::error::StoreError;
use crate::types::TaskId;

/// Storage for task files grouped by stage.
pub trait TaskStore: Send + Sync {
    /// Task ids in `state`, sorted lexically by file name.
    fn list(&self, state: TaskState) -> Result<Vec<TaskId>, StoreError>;

    fn read(&self, state: TaskState, id: &TaskId) -> Result<String, StoreError>;

    /// Create or overwrite a task file in `state`.
    fn write(&self, state: TaskState, id: &TaskId, contents: &str) -> Result<(), StoreError>;

    /// Move a task between stages after validating the transition.
    ///
    /// Fails with [`StoreError::AlreadyExists`] rather than overwrite a file
    /// of the same name in the destination.
    fn transition(&self, id: &TaskId, from: TaskState, to: TaskState) -> Result<(), StoreError>;

    /// Write the plan for `id`, returning the plan's file name.
    fn write_plan(&self, id: &TaskId, contents: &str) -> Result<String, StoreError>;

    fn read_record(&self, state: TaskState, id: &TaskId) -> Result<TaskRecord, StoreError> {
        Ok(codec::parse(&self.read(state, id)?))
    }

    fn write_record(
        &self,
        state: TaskState,
        id: &TaskId,
        record: &TaskRecord,
    ) -> Result<(), StoreError> {
        self.write(state, id, &record.render())
    }
}

/// File name of the plan written for a task.
pub fn plan_file_name(id: &TaskId) -> String {
    format!("{}_plan.md", id)
}
