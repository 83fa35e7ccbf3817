//! Retrying action executor.
//!
//! Composes the rate limiter, the action mapper, the duplicate check and an
//! action client into one attempt/retry loop per approval request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use courier_core::config::ExecutorConfig;
use serde_json::Value;
use tracing::{info, warn};

use crate::audit::{AuditLog, LogEntry};
use crate::client::ActionClient;
use crate::error::ActionError;
use crate::mapper::ActionMapper;
use crate::rate_limit::{Deferral, RateLimiterState};
use crate::similarity::{self, Verdict};
use crate::types::{ActionKind, ApprovalRequest, RemoteCall};

/// Audit action name for an executed approval request.
pub const EXECUTE_ACTION: &str = "execute_approved_action";

/// `source` value on entries the social server writes to the shared log.
const SOCIAL_SERVER_SOURCE: &str = "social_server";

/// Social server actions that put content in front of an audience.
const SOCIAL_SERVER_ACTIONS: &[&str] = &["draft_created", "post_created"];

/// Exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            multiplier: config.backoff_multiplier,
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor)
    }
}

/// Suspends between attempts. Swapped out in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Result of executing one approval request.
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// Deferred by a rate gate; nothing was attempted.
    RateLimited(Deferral),
    Succeeded {
        attempts: u32,
        call: RemoteCall,
        payload: Value,
    },
    Failed {
        error: ActionError,
        attempts: u32,
    },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Succeeded { .. })
    }
}

/// Executes approval requests one at a time.
pub struct Executor {
    client: Arc<dyn ActionClient>,
    mapper: ActionMapper,
    limits: RateLimiterState,
    audit: Arc<AuditLog>,
    policy: RetryPolicy,
    call_timeout: Duration,
    duplicate_lookback_days: u32,
    sleeper: Arc<dyn Sleeper>,
}

impl Executor {
    pub fn new(
        client: Arc<dyn ActionClient>,
        mapper: ActionMapper,
        limits: RateLimiterState,
        audit: Arc<AuditLog>,
        config: &ExecutorConfig,
    ) -> Self {
        Self {
            client,
            mapper,
            limits,
            audit,
            policy: RetryPolicy::from_config(config),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            duplicate_lookback_days: config.duplicate_lookback_days,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn is_dry_run(&self) -> bool {
        self.client.is_dry_run()
    }

    pub fn rate_limits_mut(&mut self) -> &mut RateLimiterState {
        &mut self.limits
    }

    /// Run `request` through the rate gates and the retry loop.
    pub async fn execute(&mut self, request: &ApprovalRequest) -> ExecutionOutcome {
        if let Some(deferral) = self.limits.check(request.kind, Local::now()) {
            info!(
                file = %request.id,
                action = %request.kind,
                wait_secs = deferral.wait().as_secs(),
                "Rate limited, deferring"
            );
            return ExecutionOutcome::RateLimited(deferral);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            info!(file = %request.id, action = %request.kind, attempt, "Executing action");

            match self.attempt(request, attempt).await {
                Ok((call, payload)) => {
                    if let Err(e) = self
                        .limits
                        .record(request.kind, Local::now(), &request.id.file_name())
                    {
                        warn!(file = %request.id, error = %e, "Failed to persist quota counter");
                    }
                    info!(file = %request.id, attempts = attempt, "Action succeeded");
                    return ExecutionOutcome::Succeeded {
                        attempts: attempt,
                        call,
                        payload,
                    };
                }
                Err(error) if error.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        file = %request.id,
                        attempt,
                        error = %error,
                        delay_ms = delay.as_millis() as u64,
                        "Attempt failed, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                }
                Err(error) => {
                    warn!(file = %request.id, attempts = attempt, error = %error, "Action failed");
                    return ExecutionOutcome::Failed {
                        error,
                        attempts: attempt,
                    };
                }
            }
        }
    }

    async fn attempt(
        &self,
        request: &ApprovalRequest,
        attempt: u32,
    ) -> Result<(RemoteCall, Value), ActionError> {
        let call = self.mapper.map(request)?;

        if request.kind == ActionKind::PostSocial
            && attempt == 1
            && !request.flag("skip_duplicate_check")
        {
            let content = call.argument_str("content").unwrap_or_default();
            self.check_duplicate(content)?;
        }

        let payload = self.client.call(&call, self.call_timeout).await?;
        Ok((call, payload))
    }

    /// Compare `content` with social posts recorded in the audit log.
    fn check_duplicate(&self, content: &str) -> Result<(), ActionError> {
        let history = self
            .audit
            .recent(self.duplicate_lookback_days, Local::now().date_naive());
        for entry in &history {
            let Some(prior) = self.published_content(entry) else {
                continue;
            };
            match similarity::compare(content, &prior) {
                Verdict::Exact => {
                    return Err(ActionError::DuplicateContent(format!(
                        "identical to post logged at {} ({})",
                        entry.timestamp.format("%Y-%m-%d %H:%M"),
                        entry.file
                    )));
                }
                Verdict::NearDuplicate(score) => {
                    warn!(score, prior = %entry.file, "Post closely resembles a recent post");
                }
                Verdict::Distinct => {}
            }
        }
        Ok(())
    }

    /// Content of a social post recorded in `entry`, if any.
    ///
    /// Our own entries count only when they succeeded. The social server
    /// writes no `success` field; its draft and post entries always count.
    fn published_content(&self, entry: &LogEntry) -> Option<String> {
        let published = if entry.detail_str("source") == Some(SOCIAL_SERVER_SOURCE) {
            SOCIAL_SERVER_ACTIONS.contains(&entry.action.as_str())
        } else {
            entry.success && entry.detail_str("action_type") == Some("post_social")
        };
        if !published {
            return None;
        }
        if let Some(content) = entry.detail_str("content") {
            return Some(content.to_string());
        }
        entry
            .detail_str("draft_id")
            .or_else(|| entry.detail_str("draftId"))
            .and_then(|id| self.mapper.drafts().content(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::mapper::DraftStore;
    use crate::rate_limit::{QuotaBook, SlidingWindowLimiter};
    use crate::types::TaskId;
    use courier_core::config::QuotasConfig;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Pops scripted results; records every call it sees.
    struct ScriptedClient {
        results: Mutex<VecDeque<Result<Value, ActionError>>>,
        calls: Mutex<Vec<RemoteCall>>,
    }

    impl ScriptedClient {
        fn new(results: Vec<Result<Value, ActionError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ActionClient for ScriptedClient {
        async fn call(&self, call: &RemoteCall, _timeout: Duration) -> Result<Value, ActionError> {
            self.calls.lock().unwrap().push(call.clone());
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({"success": true})))
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        audit: Arc<AuditLog>,
        sleeper: Arc<RecordingSleeper>,
        executor: Executor,
    }

    fn fixture(client: Arc<ScriptedClient>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecutorConfig::default();
        let audit = Arc::new(AuditLog::new(dir.path().join("Logs")));
        let sleeper = Arc::new(RecordingSleeper::default());
        let limits = RateLimiterState::new(
            SlidingWindowLimiter::new(config.max_actions_per_window, Duration::from_secs(config.window_secs)),
            QuotaBook::in_memory(QuotasConfig::default()),
        );
        let mapper = ActionMapper::new(DraftStore::new(dir.path().join("Social_Drafts")), 3000);
        let executor = Executor::new(client, mapper, limits, Arc::clone(&audit), &config)
            .with_sleeper(sleeper.clone());
        Fixture {
            _dir: dir,
            audit,
            sleeper,
            executor,
        }
    }

    fn request(text: &str) -> ApprovalRequest {
        ApprovalRequest::from_record(TaskId::new("REQ_1"), codec::parse(text)).unwrap()
    }

    fn email_request() -> ApprovalRequest {
        request("---\naction: send_email\nstatus: approved\nemail_to: ann@example.com\n---\nHello\n")
    }

    fn social_request(body: &str) -> ApprovalRequest {
        request(&format!("---\naction: post_social\nstatus: approved\n---\n{}\n", body))
    }

    fn remote_failure() -> Result<Value, ActionError> {
        Err(ActionError::RemoteFailure("connection reset".to_string()))
    }

    // ---- retry policy ----

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::from_config(&ExecutorConfig::default());
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        let config = ExecutorConfig {
            max_retries: 0,
            ..ExecutorConfig::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).max_retries, 1);
    }

    // ---- execute ----

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let client = ScriptedClient::new(vec![Ok(json!({"id": "msg-1"}))]);
        let mut fx = fixture(client.clone());
        match fx.executor.execute(&email_request()).await {
            ExecutionOutcome::Succeeded { attempts, call, payload } => {
                assert_eq!(attempts, 1);
                assert_eq!(call.procedure, "send_email");
                assert_eq!(payload["id"], "msg-1");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(fx.sleeper.sleeps.lock().unwrap().is_empty());
        assert_eq!(fx.executor.rate_limits_mut().window.in_window(Local::now()), 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let client = ScriptedClient::new(vec![remote_failure(), remote_failure(), Ok(json!({}))]);
        let mut fx = fixture(client.clone());
        let outcome = fx.executor.execute(&email_request()).await;
        assert!(matches!(outcome, ExecutionOutcome::Succeeded { attempts: 3, .. }));
        assert_eq!(
            *fx.sleeper.sleeps.lock().unwrap(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausts_retries() {
        let client = ScriptedClient::new(vec![
            Err(ActionError::Timeout(Duration::from_secs(30))),
            remote_failure(),
            remote_failure(),
        ]);
        let mut fx = fixture(client.clone());
        match fx.executor.execute(&email_request()).await {
            ExecutionOutcome::Failed { error, attempts } => {
                assert_eq!(attempts, 3);
                assert!(matches!(error, ActionError::RemoteFailure(_)));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(fx.sleeper.sleeps.lock().unwrap().len(), 2);
        // failures do not consume rate budget
        assert_eq!(fx.executor.rate_limits_mut().window.in_window(Local::now()), 0);
    }

    #[tokio::test]
    async fn test_validation_failure_is_not_retried() {
        let client = ScriptedClient::new(vec![]);
        let mut fx = fixture(client.clone());
        let req = request("---\naction: send_email\nstatus: approved\nemail_to: nobody\n---\nx\n");
        let outcome = fx.executor.execute(&req).await;
        assert!(matches!(
            outcome,
            ExecutionOutcome::Failed {
                error: ActionError::Validation(_),
                attempts: 1
            }
        ));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_rate_limited_does_nothing() {
        let client = ScriptedClient::new(vec![]);
        let mut fx = fixture(client.clone());
        let now = Local::now();
        for _ in 0..10 {
            fx.executor.rate_limits_mut().window.record_at(now);
        }
        let outcome = fx.executor.execute(&email_request()).await;
        match outcome {
            ExecutionOutcome::RateLimited(deferral) => {
                assert!(matches!(deferral, Deferral::Window { .. }));
                assert!(deferral.wait() > Duration::from_secs(3500));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(client.call_count(), 0);
    }

    // ---- duplicate detection ----

    #[tokio::test]
    async fn test_exact_duplicate_fails_without_call() {
        let client = ScriptedClient::new(vec![]);
        let mut fx = fixture(client.clone());
        let two_days_ago = Local::now() - chrono::Duration::days(2);
        fx.audit
            .append(
                &LogEntry::new(EXECUTE_ACTION, "OLD.md", true)
                    .with_timestamp(two_days_ago)
                    .with_detail("action_type", "post_social")
                    .with_detail("content", "Big launch   today!"),
            )
            .unwrap();

        let outcome = fx.executor.execute(&social_request("big launch today!")).await;
        assert!(matches!(
            outcome,
            ExecutionOutcome::Failed {
                error: ActionError::DuplicateContent(_),
                attempts: 1
            }
        ));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_check_can_be_skipped() {
        let client = ScriptedClient::new(vec![]);
        let mut fx = fixture(client.clone());
        fx.audit
            .append(
                &LogEntry::new(EXECUTE_ACTION, "OLD.md", true)
                    .with_detail("action_type", "post_social")
                    .with_detail("content", "same words"),
            )
            .unwrap();
        let req = request(
            "---\naction: post_social\nstatus: approved\nskip_duplicate_check: true\n---\nsame words\n",
        );
        assert!(fx.executor.execute(&req).await.is_success());
    }

    #[tokio::test]
    async fn test_near_duplicate_only_warns() {
        let client = ScriptedClient::new(vec![]);
        let mut fx = fixture(client.clone());
        fx.audit
            .append(
                &LogEntry::new(EXECUTE_ACTION, "OLD.md", true)
                    .with_detail("action_type", "post_social")
                    .with_detail("content", "today big launch"),
            )
            .unwrap();
        assert!(fx.executor.execute(&social_request("big launch today")).await.is_success());
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_and_old_posts_are_ignored() {
        let client = ScriptedClient::new(vec![]);
        let mut fx = fixture(client.clone());
        fx.audit
            .append(
                &LogEntry::new(EXECUTE_ACTION, "FAILED.md", false)
                    .with_detail("action_type", "post_social")
                    .with_detail("content", "retry me"),
            )
            .unwrap();
        fx.audit
            .append(
                &LogEntry::new(EXECUTE_ACTION, "OLD.md", true)
                    .with_timestamp(Local::now() - chrono::Duration::days(9))
                    .with_detail("action_type", "post_social")
                    .with_detail("content", "retry me"),
            )
            .unwrap();
        assert!(fx.executor.execute(&social_request("retry me")).await.is_success());
    }

    #[tokio::test]
    async fn test_social_server_entries_count_as_published() {
        let client = ScriptedClient::new(vec![]);
        let mut fx = fixture(client.clone());
        // written by the social server: no `success` field, camelCase draft id
        let raw = json!([
            {
                "timestamp": (Local::now() - chrono::Duration::days(2)).to_rfc3339(),
                "action": "post_created",
                "source": "social_server",
                "content": "Big launch today"
            }
        ]);
        let day = (Local::now() - chrono::Duration::days(2)).date_naive();
        std::fs::create_dir_all(fx.audit.dir()).unwrap();
        std::fs::write(fx.audit.path_for(day), raw.to_string()).unwrap();

        let outcome = fx.executor.execute(&social_request("Big launch today")).await;
        assert!(matches!(
            outcome,
            ExecutionOutcome::Failed {
                error: ActionError::DuplicateContent(_),
                ..
            }
        ));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_social_server_draft_is_resolved_by_camel_case_id() {
        let client = ScriptedClient::new(vec![]);
        let mut fx = fixture(client.clone());
        let drafts = fx._dir.path().join("Social_Drafts");
        std::fs::create_dir_all(&drafts).unwrap();
        std::fs::write(
            drafts.join("D42.json"),
            json!({"content": "Spring sale starts now"}).to_string(),
        )
        .unwrap();
        fx.audit
            .append(
                &LogEntry::new("draft_created", "", false)
                    .with_detail("source", "social_server")
                    .with_detail("draftId", "D42"),
            )
            .unwrap();

        let outcome = fx.executor.execute(&social_request("spring sale starts now")).await;
        assert!(!outcome.is_success());
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_other_social_server_actions_are_ignored() {
        let client = ScriptedClient::new(vec![]);
        let mut fx = fixture(client.clone());
        fx.audit
            .append(
                &LogEntry::new("draft_deleted", "", false)
                    .with_detail("source", "social_server")
                    .with_detail("content", "gone for good"),
            )
            .unwrap();
        assert!(fx.executor.execute(&social_request("gone for good")).await.is_success());
    }

    #[tokio::test]
    async fn test_duplicate_check_only_on_first_attempt() {
        let client = ScriptedClient::new(vec![remote_failure(), Ok(json!({}))]);
        let mut fx = fixture(client.clone());
        assert!(fx.executor.execute(&social_request("fresh post")).await.is_success());
        assert_eq!(client.call_count(), 2);
    }
}
