//! Classifier and router for `Needs_Action`.
//!
//! Each task body is categorized by keyword rules, a plan is written, the
//! task header is updated, and the file is routed to its next stage.
//! Normal and low-priority tasks stay where they are; a `processedAt`
//! header marks them as already handled.

pub mod plan;
pub mod rules;

pub use rules::{classify, Classification};

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::audit::{AuditLog, LogEntry};
use crate::error::StoreError;
use crate::task::{TaskState, TaskStore};
use crate::types::{Category, TaskId};

/// Header key stamped on every classified task.
pub const PROCESSED_AT: &str = "processedAt";

/// Stage a category routes to, if it leaves `Needs_Action`.
pub fn destination(category: Category) -> Option<TaskState> {
    match category {
        Category::ApprovalRequired => Some(TaskState::PendingApproval),
        Category::AutoComplete => Some(TaskState::Done),
        Category::HighPriority => Some(TaskState::HighPriority),
        Category::LowPriority | Category::Normal => None,
    }
}

fn audit_action(category: Category) -> &'static str {
    match category {
        Category::ApprovalRequired => "requires_approval",
        Category::AutoComplete => "auto_complete",
        Category::HighPriority => "high_priority",
        Category::LowPriority | Category::Normal => "categorized",
    }
}

/// Counts from one classification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifySummary {
    pub processed: usize,
    pub auto_completed: usize,
    pub high_priority: usize,
    pub pending_approval: usize,
    pub low_priority: usize,
    pub normal: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl ClassifySummary {
    fn count(&mut self, category: Category) {
        self.processed += 1;
        match category {
            Category::ApprovalRequired => self.pending_approval += 1,
            Category::AutoComplete => self.auto_completed += 1,
            Category::HighPriority => self.high_priority += 1,
            Category::LowPriority => self.low_priority += 1,
            Category::Normal => self.normal += 1,
        }
    }
}

/// Outcome for a single task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Classified {
        classification: Classification,
        plan: String,
        destination: Option<TaskState>,
    },
    AlreadyProcessed,
}

pub struct Classifier {
    store: Arc<dyn TaskStore>,
    audit: Arc<AuditLog>,
    dry_run: bool,
    /// Tasks whose last attempt failed; their repeat failures are not audited.
    failing: HashSet<TaskId>,
}

impl Classifier {
    pub fn new(store: Arc<dyn TaskStore>, audit: Arc<AuditLog>) -> Self {
        Self {
            store,
            audit,
            dry_run: false,
            failing: HashSet::new(),
        }
    }

    /// Classify without writing plans, headers or moving files.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Classify every task in `Needs_Action`, in lexical order.
    ///
    /// Listing the stage is the only fatal error; per-task failures are
    /// counted every pass but logged and audited only when they start.
    pub fn run(&mut self) -> Result<ClassifySummary, StoreError> {
        let mut summary = ClassifySummary::default();
        let ids = self.store.list(TaskState::NeedsAction)?;
        self.failing.retain(|id| ids.contains(id));
        for id in ids {
            match self.process(&id) {
                Ok(routed) => {
                    self.failing.remove(&id);
                    match routed {
                        Routed::Classified { classification, .. } => {
                            summary.count(classification.category)
                        }
                        Routed::AlreadyProcessed => summary.skipped += 1,
                    }
                }
                Err(e) => {
                    summary.errors += 1;
                    if !self.failing.insert(id.clone()) {
                        debug!(file = %id, error = %e, "Task still cannot be classified");
                        continue;
                    }
                    warn!(file = %id, error = %e, "Failed to classify task");
                    if !self.dry_run {
                        self.audit.record(
                            LogEntry::new("error", id.file_name(), false)
                                .with_detail("error", e.to_string()),
                        );
                    }
                }
            }
        }
        if summary.processed > 0 || summary.errors > 0 {
            info!(
                processed = summary.processed,
                pending_approval = summary.pending_approval,
                high_priority = summary.high_priority,
                auto_completed = summary.auto_completed,
                errors = summary.errors,
                "Classification pass complete"
            );
        }
        Ok(summary)
    }

    /// Classify and route one task from `Needs_Action`.
    pub fn process(&self, id: &TaskId) -> Result<Routed, StoreError> {
        let mut record = self.store.read_record(TaskState::NeedsAction, id)?;
        if record.headers.contains_key(PROCESSED_AT) {
            return Ok(Routed::AlreadyProcessed);
        }

        let now = Local::now();
        let classification = classify(&record.body);
        let Classification { category, priority } = classification;
        let target = destination(category);
        let plan_name = crate::task::plan_file_name(id);

        if self.dry_run {
            info!(file = %id, category = %category, priority = %priority, "[DRY RUN] Classified task");
            return Ok(Routed::Classified {
                classification,
                plan: plan_name,
                destination: target,
            });
        }

        // Move first so a blocked move leaves no plan and an untouched task.
        let stage = match target {
            Some(to) => {
                self.store.transition(id, TaskState::NeedsAction, to)?;
                to
            }
            None => TaskState::NeedsAction,
        };

        let plan = self
            .store
            .write_plan(id, &plan::render(id, &record.body, classification, now))?;

        record.headers.insert("category", category.to_string());
        record.headers.insert("priority", priority.to_string());
        record.headers.insert(PROCESSED_AT, now.to_rfc3339());
        if category == Category::AutoComplete {
            record.headers.insert("status", "completed");
        }
        self.store.write_record(stage, id, &record)?;

        info!(
            file = %id,
            category = %category,
            priority = %priority,
            stage = %stage,
            "Task classified"
        );
        self.audit.record(
            LogEntry::new(audit_action(category), id.file_name(), true)
                .with_detail("plan", plan.clone())
                .with_detail("category", category.to_string())
                .with_detail("priority", priority.to_string()),
        );

        Ok(Routed::Classified {
            classification,
            plan,
            destination: target,
        })
    }
}
