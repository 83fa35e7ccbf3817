//! Vault-backed task store: one folder per stage, moves by rename.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{plan_file_name, validate_transition, TaskState, TaskStore};
use crate::error::StoreError;
use crate::types::TaskId;

/// Paths of every folder in a vault.
#[derive(Debug, Clone)]
pub struct VaultLayout {
    root: PathBuf,
}

impl VaultLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stage_dir(&self, state: TaskState) -> PathBuf {
        self.root.join(state.folder_name())
    }

    pub fn plans_dir(&self) -> PathBuf {
        self.root.join("Plans")
    }

    /// Daily audit files.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("Logs")
    }

    /// Persisted per-kind quota counters.
    pub fn quota_dir(&self) -> PathBuf {
        self.logs_dir().join("rate_limits")
    }

    /// Social post drafts referenced by `draft_id`.
    pub fn drafts_dir(&self) -> PathBuf {
        self.root.join("Social_Drafts")
    }

    /// Create every stage folder plus plans and logs.
    pub fn ensure(&self) -> std::io::Result<()> {
        for state in TaskState::ALL {
            std::fs::create_dir_all(self.stage_dir(state))?;
        }
        std::fs::create_dir_all(self.plans_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

/// Task store backed by the vault's stage folders.
#[derive(Debug, Clone)]
pub struct FolderTaskStore {
    layout: VaultLayout,
}

impl FolderTaskStore {
    pub fn new(layout: VaultLayout) -> Self {
        Self { layout }
    }

    /// Open a vault, creating any missing stage folders.
    pub fn open(layout: VaultLayout) -> Result<Self, StoreError> {
        layout.ensure()?;
        Ok(Self::new(layout))
    }

    pub fn layout(&self) -> &VaultLayout {
        &self.layout
    }

    fn path(&self, state: TaskState, id: &TaskId) -> PathBuf {
        self.layout.stage_dir(state).join(id.file_name())
    }
}

impl TaskStore for FolderTaskStore {
    fn list(&self, state: TaskState) -> Result<Vec<TaskId>, StoreError> {
        let dir = self.layout.stage_dir(state);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(TaskId::from_file_name) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn read(&self, state: TaskState, id: &TaskId) -> Result<String, StoreError> {
        let path = self.path(state, id);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.clone(), state))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, state: TaskState, id: &TaskId, contents: &str) -> Result<(), StoreError> {
        let dir = self.layout.stage_dir(state);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(id.file_name()), contents)?;
        Ok(())
    }

    fn transition(&self, id: &TaskId, from: TaskState, to: TaskState) -> Result<(), StoreError> {
        validate_transition(from, to)?;
        let source = self.path(from, id);
        if !source.exists() {
            return Err(StoreError::NotFound(id.clone(), from));
        }
        let target = self.path(to, id);
        if target.exists() {
            return Err(StoreError::AlreadyExists(id.clone(), to));
        }
        std::fs::create_dir_all(self.layout.stage_dir(to))?;
        std::fs::rename(&source, &target)?;
        debug!(task = %id, from = %from, to = %to, "Moved task");
        Ok(())
    }

    fn write_plan(&self, id: &TaskId, contents: &str) -> Result<String, StoreError> {
        let dir = self.layout.plans_dir();
        std::fs::create_dir_all(&dir)?;
        let name = plan_file_name(id);
        std::fs::write(dir.join(&name), contents)?;
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (tempfile::TempDir, FolderTaskStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FolderTaskStore::open(VaultLayout::new(dir.path())).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_creates_layout() {
        let (dir, _store) = open_store();
        for state in TaskState::ALL {
            assert!(dir.path().join(state.folder_name()).is_dir());
        }
        assert!(dir.path().join("Plans").is_dir());
        assert!(dir.path().join("Logs").is_dir());
    }

    #[test]
    fn test_list_is_sorted_and_filters_non_tasks() {
        let (dir, store) = open_store();
        let approved = dir.path().join("Approved");
        std::fs::write(approved.join("b.md"), "").unwrap();
        std::fs::write(approved.join("a.md"), "").unwrap();
        std::fs::write(approved.join("notes.txt"), "").unwrap();
        std::fs::create_dir(approved.join("sub.md")).unwrap();

        let ids = store.list(TaskState::Approved).unwrap();
        assert_eq!(ids, vec![TaskId::new("a"), TaskId::new("b")]);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (_dir, store) = open_store();
        let id = TaskId::new("EMAIL_1");
        store.write(TaskState::Inbox, &id, "hello").unwrap();
        assert_eq!(store.read(TaskState::Inbox, &id).unwrap(), "hello");
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let (_dir, store) = open_store();
        let err = store.read(TaskState::Done, &TaskId::new("nope")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_, TaskState::Done)));
    }

    #[test]
    fn test_transition_moves_file() {
        let (dir, store) = open_store();
        let id = TaskId::new("EMAIL_1");
        store.write(TaskState::Approved, &id, "x").unwrap();
        store.transition(&id, TaskState::Approved, TaskState::Done).unwrap();
        assert!(!dir.path().join("Approved/EMAIL_1.md").exists());
        assert!(dir.path().join("Done/EMAIL_1.md").exists());
    }

    #[test]
    fn test_transition_rejects_invalid_and_missing() {
        let (_dir, store) = open_store();
        let id = TaskId::new("EMAIL_1");
        store.write(TaskState::Done, &id, "x").unwrap();
        assert!(matches!(
            store.transition(&id, TaskState::Done, TaskState::Approved),
            Err(StoreError::InvalidTransition(..))
        ));
        assert!(matches!(
            store.transition(&id, TaskState::Approved, TaskState::Done),
            Err(StoreError::NotFound(..))
        ));
    }

    #[test]
    fn test_transition_does_not_overwrite() {
        let (dir, store) = open_store();
        let id = TaskId::new("EMAIL_1");
        store.write(TaskState::Approved, &id, "new").unwrap();
        store.write(TaskState::Done, &id, "old").unwrap();
        assert!(matches!(
            store.transition(&id, TaskState::Approved, TaskState::Done),
            Err(StoreError::AlreadyExists(..))
        ));
        let kept = std::fs::read_to_string(dir.path().join("Done/EMAIL_1.md")).unwrap();
        assert_eq!(kept, "old");
    }

    #[test]
    fn test_write_plan() {
        let (dir, store) = open_store();
        let name = store.write_plan(&TaskId::new("EMAIL_1"), "# Plan").unwrap();
        assert_eq!(name, "EMAIL_1_plan.md");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("Plans").join(name)).unwrap(),
            "# Plan"
        );
    }

    #[test]
    fn test_layout_paths() {
        let layout = VaultLayout::new("/vault");
        assert_eq!(layout.stage_dir(TaskState::PendingApproval), PathBuf::from("/vault/Pending_Approval"));
        assert_eq!(layout.quota_dir(), PathBuf::from("/vault/Logs/rate_limits"));
        assert_eq!(layout.drafts_dir(), PathBuf::from("/vault/Social_Drafts"));
    }
}
