//! Inbox ingestion: moves raw drops into `Needs_Action`.

use std::collections::HashSet;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::audit::{AuditLog, LogEntry};
use crate::codec::{self, Headers};
use crate::error::StoreError;
use crate::task::{TaskState, TaskStore};
use crate::types::TaskId;

/// Counts from one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub moved: usize,
    pub stamped: usize,
    pub errors: usize,
}

/// Header stamped onto files that arrive without one.
fn default_headers() -> Headers {
    let mut headers = Headers::new();
    headers.insert("createdAt", Local::now().to_rfc3339());
    headers.insert("source", "inbox");
    headers.insert("status", "pending");
    headers
}

/// Move every file in `Inbox` to `Needs_Action`, in lexical order.
///
/// Only listing `Inbox` is fatal; a failing file is logged and skipped.
pub fn ingest_inbox(
    store: &dyn TaskStore,
    audit: &AuditLog,
    dry_run: bool,
) -> Result<IngestSummary, StoreError> {
    ingest_pending(store, audit, dry_run, &mut HashSet::new())
}

/// [`ingest_inbox`] for repeated passes.
///
/// `failing` holds files whose last attempt failed. They are retried every
/// pass, but logged and audited only when they first fail.
pub fn ingest_pending(
    store: &dyn TaskStore,
    audit: &AuditLog,
    dry_run: bool,
    failing: &mut HashSet<TaskId>,
) -> Result<IngestSummary, StoreError> {
    let mut summary = IngestSummary::default();
    let ids = store.list(TaskState::Inbox)?;
    failing.retain(|id| ids.contains(id));
    for id in ids {
        if dry_run {
            info!(file = %id, "[DRY RUN] Would move to Needs_Action");
            summary.moved += 1;
            continue;
        }
        match ingest_one(store, &id) {
            Ok(stamped) => {
                failing.remove(&id);
                summary.moved += 1;
                if stamped {
                    summary.stamped += 1;
                }
                info!(file = %id, stamped, "Moved to Needs_Action");
                audit.record(
                    LogEntry::new("move_to_needs_action", id.file_name(), true)
                        .with_detail("from", TaskState::Inbox.folder_name())
                        .with_detail("to", TaskState::NeedsAction.folder_name()),
                );
            }
            Err(e) => {
                summary.errors += 1;
                if !failing.insert(id.clone()) {
                    debug!(file = %id, error = %e, "File still cannot be ingested");
                    continue;
                }
                warn!(file = %id, error = %e, "Failed to ingest file");
                audit.record(
                    LogEntry::new("move_to_needs_action", id.file_name(), false)
                        .with_detail("error", e.to_string()),
                );
            }
        }
    }
    Ok(summary)
}

/// Returns whether a header had to be stamped.
fn ingest_one(store: &dyn TaskStore, id: &TaskId) -> Result<bool, StoreError> {
    let text = store.read(TaskState::Inbox, id)?;
    store.transition(id, TaskState::Inbox, TaskState::NeedsAction)?;
    if text.starts_with(codec::DELIMITER) {
        return Ok(false);
    }
    let stamped = codec::serialize(&default_headers(), &format!("\n{}", text));
    store.write(TaskState::NeedsAction, id, &stamped)?;
    Ok(true)
}
