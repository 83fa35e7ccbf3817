//! In-memory task store for tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use courier_core::error::CourierError;

use super::{plan_file_name, validate_transition, TaskState, TaskStore};
use crate::error::StoreError;
use crate::types::TaskId;

#[derive(Default)]
struct Inner {
    files: BTreeMap<(TaskState, TaskId), String>,
    plans: BTreeMap<String, String>,
}

/// In-memory task store with the same semantics as the folder store.
#[derive(Default)]
pub struct MemoryTaskStore {
    inner: Mutex<Inner>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|e| {
            StoreError::Storage(CourierError::Storage(format!("Lock poisoned: {}", e)))
        })
    }

    /// Contents of a written plan, if any.
    pub fn plan(&self, id: &TaskId) -> Option<String> {
        self.lock().ok()?.plans.get(&plan_file_name(id)).cloned()
    }

    /// Stage currently holding `id`, if any.
    pub fn stage_of(&self, id: &TaskId) -> Option<TaskState> {
        let inner = self.lock().ok()?;
        inner
            .files
            .keys()
            .find(|(_, file)| file == id)
            .map(|(state, _)| *state)
    }
}

impl TaskStore for MemoryTaskStore {
    fn list(&self, state: TaskState) -> Result<Vec<TaskId>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .files
            .keys()
            .filter(|(s, _)| *s == state)
            .map(|(_, id)| id.clone())
            .collect())
    }

    fn read(&self, state: TaskState, id: &TaskId) -> Result<String, StoreError> {
        let inner = self.lock()?;
        inner
            .files
            .get(&(state, id.clone()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone(), state))
    }

    fn write(&self, state: TaskState, id: &TaskId, contents: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.files.insert((state, id.clone()), contents.to_string());
        Ok(())
    }

    fn transition(&self, id: &TaskId, from: TaskState, to: TaskState) -> Result<(), StoreError> {
        validate_transition(from, to)?;
        let mut inner = self.lock()?;
        if inner.files.contains_key(&(to, id.clone())) {
            return Err(StoreError::AlreadyExists(id.clone(), to));
        }
        let contents = inner
            .files
            .remove(&(from, id.clone()))
            .ok_or_else(|| StoreError::NotFound(id.clone(), from))?;
        inner.files.insert((to, id.clone()), contents);
        Ok(())
    }

    fn write_plan(&self, id: &TaskId, contents: &str) -> Result<String, StoreError> {
        let mut inner = self.lock()?;
        let name = plan_file_name(id);
        inner.plans.insert(name.clone(), contents.to_string());
        Ok(name)
    }
}
