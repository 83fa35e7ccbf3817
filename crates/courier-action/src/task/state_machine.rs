//! Stage lifecycle with validated transitions.
//!
//! Inbox -> Needs_Action -> Pending_Approval | High_Priority | Done
//! Pending_Approval -> Approved | Rejected (a human moves the file)
//! Approved -> Done | Failed

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StoreError;

/// A pipeline stage. Each stage is a folder of task files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Inbox,
    NeedsAction,
    HighPriority,
    PendingApproval,
    Approved,
    Rejected,
    Done,
    Failed,
}

impl TaskState {
    pub const ALL: [TaskState; 8] = [
        TaskState::Inbox,
        TaskState::NeedsAction,
        TaskState::HighPriority,
        TaskState::PendingApproval,
        TaskState::Approved,
        TaskState::Rejected,
        TaskState::Done,
        TaskState::Failed,
    ];

    /// Folder name under the vault root.
    pub fn folder_name(&self) -> &'static str {
        match self {
            TaskState::Inbox => "Inbox",
            TaskState::NeedsAction => "Needs_Action",
            TaskState::HighPriority => "High_Priority",
            TaskState::PendingApproval => "Pending_Approval",
            TaskState::Approved => "Approved",
            TaskState::Rejected => "Rejected",
            TaskState::Done => "Done",
            TaskState::Failed => "Failed",
        }
    }

    /// No transition leaves a terminal stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed | TaskState::Rejected)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskState::ALL
            .into_iter()
            .find(|state| state.folder_name() == s)
            .ok_or_else(|| format!("Unknown stage: {}", s))
    }
}

/// Validate that a stage move is allowed.
pub fn validate_transition(from: TaskState, to: TaskState) -> Result<(), StoreError> {
    let valid = matches!(
        (from, to),
        (TaskState::Inbox, TaskState::NeedsAction)
            | (TaskState::NeedsAction, TaskState::PendingApproval)
            | (TaskState::NeedsAction, TaskState::HighPriority)
            | (TaskState::NeedsAction, TaskState::Done)
            | (TaskState::HighPriority, TaskState::Done)
            | (TaskState::PendingApproval, TaskState::Approved)
            | (TaskState::PendingApproval, TaskState::Rejected)
            | (TaskState::Approved, TaskState::Done)
            | (TaskState::Approved, TaskState::Failed)
    );

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition(from, to))
    }
}
