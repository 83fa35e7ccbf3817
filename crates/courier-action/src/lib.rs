//! Task pipeline and approval-gated action execution for Courier.
//!
//! Tasks are text files with an optional key/value header. They move between
//! stage folders as they are ingested, classified, approved by a human and
//! finally executed against an external action server.

pub mod audit;
pub mod classifier;
pub mod client;
pub mod codec;
pub mod error;
pub mod executor;
pub mod ingest;
pub mod mapper;
pub mod rate_limit;
pub mod similarity;
pub mod task;
pub mod types;
pub mod watcher;

pub use audit::{AuditLog, LogEntry};
pub use classifier::{Classification, Classifier, ClassifySummary};
pub use client::{ActionClient, DryRunClient, ProcessClient};
pub use codec::{Headers, TaskRecord};
pub use error::{ActionError, StoreError};
pub use executor::{ExecutionOutcome, Executor, RetryPolicy};
pub use ingest::{ingest_inbox, ingest_pending, IngestSummary};
pub use mapper::{ActionMapper, DraftStore};
pub use rate_limit::{Deferral, QuotaBook, RateLimiterState, SlidingWindowLimiter};
pub use task::{FolderTaskStore, MemoryTaskStore, TaskState, TaskStore, VaultLayout};
pub use types::{
    ActionKind, ApprovalRequest, Category, Priority, RemoteCall, ServerKind, TaskId, Timestamp,
};
pub use watcher::{ApprovalWatcher, CycleReport};
