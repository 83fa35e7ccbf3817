//! Polling watcher for the `Approved` stage.
//!
//! Each cycle re-enumerates `Approved` and hands new files to the executor
//! one at a time, then files them under `Done` or `Failed`. With an intake
//! attached, the cycle first ingests `Inbox` and classifies `Needs_Action`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::audit::{AuditLog, LogEntry};
use crate::classifier::{ClassifySummary, Classifier};
use crate::codec::TaskRecord;
use crate::error::StoreError;
use crate::executor::{ExecutionOutcome, Executor, EXECUTE_ACTION};
use crate::ingest::{ingest_pending, IngestSummary};
use crate::rate_limit::Deferral;
use crate::task::{TaskState, TaskStore};
use crate::types::{ActionKind, ApprovalRequest, TaskId};

/// Audit action for approval files that could not be parsed.
pub const PARSE_ERROR_ACTION: &str = "process_approved_file_error";

/// What happened to one approval file.
#[derive(Debug)]
pub enum Dispatch {
    Done,
    Failed,
    /// Left in place for a later cycle.
    Deferred(Deferral),
}

/// Counts from one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub ingested: Option<IngestSummary>,
    pub classified: Option<ClassifySummary>,
    pub executed: usize,
    pub failed: usize,
    pub deferred: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl CycleReport {
    /// Approval files that reached a terminal stage this cycle.
    pub fn dispatched(&self) -> usize {
        self.executed + self.failed
    }
}

pub struct ApprovalWatcher {
    store: Arc<dyn TaskStore>,
    executor: Executor,
    audit: Arc<AuditLog>,
    poll_interval: Duration,
    intake: Option<Classifier>,
    /// Inbox files whose ingestion is failing.
    ingest_failing: HashSet<TaskId>,
    seen: HashSet<TaskId>,
    shutdown: Arc<Notify>,
}

impl ApprovalWatcher {
    pub fn new(
        store: Arc<dyn TaskStore>,
        executor: Executor,
        audit: Arc<AuditLog>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            executor,
            audit,
            poll_interval,
            intake: None,
            ingest_failing: HashSet::new(),
            seen: HashSet::new(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Ingest and classify ahead of each approval pass.
    pub fn with_intake(mut self, classifier: Classifier) -> Self {
        self.intake = Some(classifier);
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.executor.is_dry_run()
    }

    /// Handle for requesting shutdown from another task.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Stop after the current cycle.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Poll until shutdown is requested. A failed cycle is logged and the
    /// loop carries on.
    pub async fn run(&mut self) {
        let shutdown = Arc::clone(&self.shutdown);
        info!(
            interval_secs = self.poll_interval.as_secs(),
            dry_run = self.is_dry_run(),
            "Watching {} for approved actions",
            TaskState::Approved
        );
        loop {
            match self.poll_once().await {
                Ok(report) => debug!(?report, "Cycle complete"),
                Err(e) => warn!(error = %e, "Poll cycle failed"),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.notified() => {
                    info!("Watcher stopping");
                    return;
                }
            }
        }
    }

    /// One full cycle: optional intake, then every new file in `Approved`
    /// in lexical order.
    pub async fn poll_once(&mut self) -> Result<CycleReport, StoreError> {
        let mut report = CycleReport::default();
        let dry_run = self.is_dry_run();

        if let Some(classifier) = &mut self.intake {
            report.ingested = Some(ingest_pending(
                self.store.as_ref(),
                &self.audit,
                dry_run,
                &mut self.ingest_failing,
            )?);
            report.classified = Some(classifier.run()?);
        }

        let pending: Vec<TaskId> = self
            .store
            .list(TaskState::Approved)?
            .into_iter()
            .filter(|id| {
                let seen = self.seen.contains(id);
                if seen {
                    report.skipped += 1;
                }
                !seen
            })
            .collect();
        if !pending.is_empty() {
            info!(count = pending.len(), "Found new approval file(s)");
        }

        for id in pending {
            match self.dispatch(&id).await {
                Ok(Dispatch::Done) => {
                    report.executed += 1;
                    self.seen.insert(id);
                }
                Ok(Dispatch::Failed) => {
                    report.failed += 1;
                    self.seen.insert(id);
                }
                Ok(Dispatch::Deferred(_)) => report.deferred += 1,
                Err(e) => {
                    warn!(file = %id, error = %e, "Could not read approval file");
                    report.errors += 1;
                }
            }
        }
        Ok(report)
    }

    /// Parse, execute and file one approval request.
    ///
    /// Only a file that vanished before it could be read is an error;
    /// everything else is reported through the returned [`Dispatch`].
    pub async fn dispatch(&mut self, id: &TaskId) -> Result<Dispatch, StoreError> {
        info!(file = %id, "Processing approval file");
        let record = match self.store.read_record(TaskState::Approved, id) {
            Ok(record) => record,
            Err(e @ StoreError::NotFound(..)) => return Err(e),
            Err(e) => {
                warn!(file = %id, error = %e, "Unreadable approval file");
                self.record_parse_error(id, &e.to_string());
                // Contents cannot be rewritten, so the file moves unannotated.
                if !self.is_dry_run() {
                    if let Err(e) = self.store.transition(id, TaskState::Approved, TaskState::Failed) {
                        warn!(file = %id, error = %e, "Failed to move approval file");
                    }
                }
                return Ok(Dispatch::Failed);
            }
        };

        let request = match ApprovalRequest::from_record(id.clone(), record.clone()) {
            Ok(request) => request,
            Err(e) => {
                warn!(file = %id, error = %e, "Malformed approval file");
                self.record_parse_error(id, &e.to_string());
                self.file_away(id, record, TaskState::Failed, 0, Some(e.to_string()));
                return Ok(Dispatch::Failed);
            }
        };

        match self.executor.execute(&request).await {
            ExecutionOutcome::RateLimited(deferral) => Ok(Dispatch::Deferred(deferral)),
            ExecutionOutcome::Succeeded {
                attempts,
                call,
                payload,
            } => {
                if !self.is_dry_run() {
                    let mut entry = execution_entry(&request, true, attempts)
                        .with_detail("procedure", call.procedure.clone());
                    if request.kind == ActionKind::PostSocial {
                        let content = call.argument_str("content").unwrap_or_default();
                        entry = entry
                            .with_detail("content", content)
                            .with_detail("content_length", content.chars().count());
                        let draft = payload
                            .get("draftId")
                            .and_then(|v| v.as_str())
                            .map(str::to_string)
                            .or_else(|| request.field("draft_id"));
                        if let Some(draft) = draft {
                            entry = entry.with_detail("draft_id", draft);
                        }
                    }
                    self.audit.record(entry);
                }
                self.file_away(id, request.record, TaskState::Done, attempts, None);
                Ok(Dispatch::Done)
            }
            ExecutionOutcome::Failed { error, attempts } => {
                if !self.is_dry_run() {
                    self.audit.record(
                        execution_entry(&request, false, attempts)
                            .with_detail("error", error.to_string())
                            .with_detail("error_kind", error.kind()),
                    );
                }
                self.file_away(
                    id,
                    request.record,
                    TaskState::Failed,
                    attempts,
                    Some(error.to_string()),
                );
                Ok(Dispatch::Failed)
            }
        }
    }

    fn record_parse_error(&self, id: &TaskId, error: &str) {
        if !self.is_dry_run() {
            self.audit.record(
                LogEntry::new(PARSE_ERROR_ACTION, id.file_name(), false).with_detail("error", error),
            );
        }
    }

    /// Move a handled file to `to` and annotate it there.
    ///
    /// A failed move is logged and leaves the file in `Approved`; the seen
    /// set keeps it from running again in this process.
    fn file_away(
        &self,
        id: &TaskId,
        mut record: TaskRecord,
        to: TaskState,
        attempts: u32,
        error: Option<String>,
    ) {
        if self.is_dry_run() {
            info!(file = %id, "[DRY RUN] Would move to {}", to);
            return;
        }

        if let Err(e) = self.store.transition(id, TaskState::Approved, to) {
            warn!(file = %id, error = %e, "Failed to move approval file");
            return;
        }
        info!(file = %id, "Moved to {}", to);

        let status = if to == TaskState::Done { "completed" } else { "failed" };
        record.headers.insert("status", status);
        record.headers.insert("executedAt", Local::now().to_rfc3339());
        record.headers.insert("attempts", attempts.to_string());
        if let Some(error) = error {
            record.headers.insert("error", error.replace(['\r', '\n'], " "));
        }
        if let Err(e) = self.store.write_record(to, id, &record) {
            warn!(file = %id, error = %e, "Failed to annotate approval file");
        }
    }
}

fn execution_entry(request: &ApprovalRequest, success: bool, attempts: u32) -> LogEntry {
    LogEntry::new(EXECUTE_ACTION, request.id.file_name(), success)
        .with_detail("action_type", request.kind.to_string())
        .with_detail("attempts", attempts)
        .with_detail("result", if success { "completed" } else { "failed" })
}
