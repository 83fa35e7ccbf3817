//! Core types and value objects for the approval pipeline.
//!
//! Defines action kinds, task categories, approval requests and the
//! remote call descriptors handed to action clients.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::TaskRecord;
use crate::error::ActionError;

/// Wall-clock timestamp used for audit entries and quota keys.
pub type Timestamp = DateTime<Local>;

// =============================================================================
// Enums
// =============================================================================

/// Outbound actions a human can approve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SendEmail,
    DraftEmail,
    SearchEmails,
    PostSocial,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::SendEmail,
        ActionKind::DraftEmail,
        ActionKind::SearchEmails,
        ActionKind::PostSocial,
    ];

    /// The action server that executes this kind.
    pub fn server(&self) -> ServerKind {
        match self {
            ActionKind::PostSocial => ServerKind::Social,
            _ => ServerKind::Email,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::SendEmail => write!(f, "send_email"),
            ActionKind::DraftEmail => write!(f, "draft_email"),
            ActionKind::SearchEmails => write!(f, "search_emails"),
            ActionKind::PostSocial => write!(f, "post_social"),
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = ActionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "send_email" => Ok(ActionKind::SendEmail),
            "draft_email" => Ok(ActionKind::DraftEmail),
            "search_emails" => Ok(ActionKind::SearchEmails),
            "post_social" => Ok(ActionKind::PostSocial),
            _ => Err(ActionError::UnsupportedAction(s.to_string())),
        }
    }
}

/// External action servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerKind {
    Email,
    Social,
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerKind::Email => write!(f, "email"),
            ServerKind::Social => write!(f, "social"),
        }
    }
}

/// Routing category assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ApprovalRequired,
    AutoComplete,
    HighPriority,
    LowPriority,
    Normal,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::ApprovalRequired => write!(f, "approval_required"),
            Category::AutoComplete => write!(f, "auto_complete"),
            Category::HighPriority => write!(f, "high_priority"),
            Category::LowPriority => write!(f, "low_priority"),
            Category::Normal => write!(f, "normal"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approval_required" => Ok(Category::ApprovalRequired),
            "auto_complete" => Ok(Category::AutoComplete),
            "high_priority" => Ok(Category::HighPriority),
            "low_priority" => Ok(Category::LowPriority),
            "normal" => Ok(Category::Normal),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// Priority written into plans and task headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

// =============================================================================
// Domain Structs
// =============================================================================

/// Identity of a task file: its name without the `.md` extension.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub const EXTENSION: &'static str = "md";

    pub fn new(stem: impl Into<String>) -> Self {
        Self(stem.into())
    }

    /// Parse `NAME.md` into a task id; other extensions are not tasks.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".md")?;
        if stem.is_empty() {
            return None;
        }
        Some(Self(stem.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.0, Self::EXTENSION)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed file from the approval stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRequest {
    pub id: TaskId,
    pub kind: ActionKind,
    pub record: TaskRecord,
}

impl ApprovalRequest {
    /// Build a request from a parsed record.
    ///
    /// The header must carry both `action` and `status`; an unknown `action`
    /// is reported as [`ActionError::UnsupportedAction`].
    pub fn from_record(id: TaskId, record: TaskRecord) -> Result<Self, ActionError> {
        if record.headers.is_empty() {
            return Err(ActionError::Parse(format!(
                "{} has no header block",
                id.file_name()
            )));
        }
        for required in ["action", "status"] {
            if record.headers.get(required).is_none() {
                return Err(ActionError::Parse(format!(
                    "{} is missing required field '{}'",
                    id.file_name(),
                    required
                )));
            }
        }
        let kind = record.value("action").unwrap_or_default().parse()?;
        Ok(Self { id, kind, record })
    }

    /// Header value with surrounding quotes removed; empty values read as absent.
    pub fn field(&self, key: &str) -> Option<String> {
        self.record.value(key).filter(|v| !v.is_empty())
    }

    pub fn body(&self) -> &str {
        &self.record.body
    }

    /// True when the header sets `key` to a truthy value.
    pub fn flag(&self, key: &str) -> bool {
        matches!(
            self.field(key).map(|v| v.to_ascii_lowercase()).as_deref(),
            Some("true" | "yes" | "1")
        )
    }
}

/// A fully resolved remote procedure invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCall {
    pub server: ServerKind,
    pub procedure: String,
    pub arguments: serde_json::Value,
}

impl RemoteCall {
    pub fn new(server: ServerKind, procedure: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            server,
            procedure: procedure.into(),
            arguments,
        }
    }

    pub fn argument_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}
