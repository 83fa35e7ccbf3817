//! Rate limiting for approved actions.
//!
//! Two independent gates apply before an action runs: a global sliding
//! window over every executed action, and per-kind hourly/daily quotas that
//! survive restarts. The state is owned by a single executor and is not
//! shared between threads.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Days, Local, TimeZone, Timelike};
use courier_core::config::{QuotaLimits, QuotasConfig};
use courier_core::error::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{ActionKind, Timestamp};

/// Entries kept in a persisted counter's history.
pub const COUNTER_HISTORY_LIMIT: usize = 100;

fn to_std(delta: chrono::Duration) -> Duration {
    delta.to_std().unwrap_or(Duration::ZERO)
}

// =============================================================================
// Sliding window
// =============================================================================

/// Allows at most `max_actions` executions inside any trailing window.
#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    max_actions: usize,
    window: chrono::Duration,
    history: VecDeque<Timestamp>,
}

impl SlidingWindowLimiter {
    pub fn new(max_actions: usize, window: Duration) -> Self {
        let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::days(36_500));
        Self {
            max_actions,
            window,
            history: VecDeque::with_capacity(max_actions),
        }
    }

    fn purge(&mut self, now: Timestamp) {
        let cutoff = now - self.window;
        while self.history.front().is_some_and(|t| *t < cutoff) {
            self.history.pop_front();
        }
    }

    pub fn can_execute_at(&mut self, now: Timestamp) -> bool {
        self.purge(now);
        self.history.len() < self.max_actions
    }

    /// Record an execution. The history never grows past `max_actions`.
    pub fn record_at(&mut self, now: Timestamp) {
        self.purge(now);
        self.history.push_back(now);
        while self.history.len() > self.max_actions {
            self.history.pop_front();
        }
    }

    /// Time until the oldest recorded execution leaves the window, or zero
    /// when a slot is already free.
    pub fn wait_time_at(&mut self, now: Timestamp) -> Duration {
        if self.can_execute_at(now) {
            return Duration::ZERO;
        }
        match self.history.front() {
            Some(oldest) => to_std(*oldest + self.window - now),
            None => Duration::ZERO,
        }
    }

    pub fn in_window(&mut self, now: Timestamp) -> usize {
        self.purge(now);
        self.history.len()
    }
}

// =============================================================================
// Per-kind quotas
// =============================================================================

/// One executed action as remembered by a quota counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: Timestamp,
    #[serde(default)]
    pub file: String,
}

/// Hourly and daily usage for one action kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionCounter {
    /// Hour key, `%Y-%m-%dT%H`.
    pub current_hour: String,
    pub count_this_hour: u32,
    /// Day key, `%Y-%m-%d`.
    pub current_date: String,
    pub count_today: u32,
    pub history: VecDeque<UsageRecord>,
}

impl ActionCounter {
    /// Reset whichever counters belong to an earlier hour or day.
    pub fn normalize(&mut self, now: Timestamp) {
        let hour = now.format("%Y-%m-%dT%H").to_string();
        let date = now.format("%Y-%m-%d").to_string();
        if self.current_hour != hour {
            self.current_hour = hour;
            self.count_this_hour = 0;
        }
        if self.current_date != date {
            self.current_date = date;
            self.count_today = 0;
            self.history.clear();
        }
    }

    pub fn record(&mut self, now: Timestamp, file: &str) {
        self.normalize(now);
        self.count_this_hour += 1;
        self.count_today += 1;
        self.history.push_back(UsageRecord {
            timestamp: now,
            file: file.to_string(),
        });
        while self.history.len() > COUNTER_HISTORY_LIMIT {
            self.history.pop_front();
        }
    }

    /// Remaining wait before `limits` admit another action, if exhausted.
    /// Assumes the counter was normalized at `now`.
    pub fn wait_for(&self, limits: QuotaLimits, now: Timestamp) -> Option<Duration> {
        if self.count_today >= limits.max_per_day {
            return Some(until_next_day(now));
        }
        if self.count_this_hour >= limits.max_per_hour {
            return Some(until_next_hour(now));
        }
        None
    }
}

fn until_next_hour(now: Timestamp) -> Duration {
    let elapsed = chrono::Duration::minutes(now.minute() as i64)
        + chrono::Duration::seconds(now.second() as i64)
        + chrono::Duration::nanoseconds(now.nanosecond() as i64 % 1_000_000_000);
    to_std(chrono::Duration::hours(1) - elapsed)
}

fn until_next_day(now: Timestamp) -> Duration {
    let next_midnight = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|naive| Local.from_local_datetime(&naive).earliest());
    match next_midnight {
        Some(midnight) => to_std(midnight - now),
        None => until_next_hour(now),
    }
}

/// Per-kind quota counters, optionally persisted as one JSON file per kind.
#[derive(Debug)]
pub struct QuotaBook {
    limits: QuotasConfig,
    counters: HashMap<ActionKind, ActionCounter>,
    dir: Option<PathBuf>,
}

impl QuotaBook {
    /// Counters that live only for this process.
    pub fn in_memory(limits: QuotasConfig) -> Self {
        Self {
            limits,
            counters: HashMap::new(),
            dir: None,
        }
    }

    /// Counters loaded from and saved to `dir/<kind>.json`.
    ///
    /// Unreadable counter files start from zero with a warning.
    pub fn persistent(limits: QuotasConfig, dir: &Path) -> Self {
        let mut counters = HashMap::new();
        for kind in ActionKind::ALL {
            let path = counter_path(dir, kind);
            if !path.exists() {
                continue;
            }
            let loaded = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|s| serde_json::from_str::<ActionCounter>(&s).map_err(|e| e.to_string()));
            match loaded {
                Ok(counter) => {
                    debug!(kind = %kind, today = counter.count_today, "Loaded quota counter");
                    counters.insert(kind, counter);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Resetting unreadable quota counter"),
            }
        }
        Self {
            limits,
            counters,
            dir: Some(dir.to_path_buf()),
        }
    }

    pub fn limits_for(&self, kind: ActionKind) -> QuotaLimits {
        match kind {
            ActionKind::SendEmail => self.limits.send_email,
            ActionKind::DraftEmail => self.limits.draft_email,
            ActionKind::SearchEmails => self.limits.search_emails,
            ActionKind::PostSocial => self.limits.post_social,
        }
    }

    /// Current counter for `kind`, normalized to `now`.
    pub fn counter(&mut self, kind: ActionKind, now: Timestamp) -> &ActionCounter {
        let counter = self.counters.entry(kind).or_default();
        counter.normalize(now);
        counter
    }

    /// Wait before `kind` may run again, or `None` when within quota.
    pub fn wait_for(&mut self, kind: ActionKind, now: Timestamp) -> Option<Duration> {
        let limits = self.limits_for(kind);
        self.counter(kind, now).wait_for(limits, now)
    }

    pub fn record(&mut self, kind: ActionKind, now: Timestamp, file: &str) -> Result<()> {
        let counter = self.counters.entry(kind).or_default();
        counter.record(now, file);
        if let Some(dir) = &self.dir {
            std::fs::create_dir_all(dir)?;
            let content = serde_json::to_string_pretty(counter)?;
            std::fs::write(counter_path(dir, kind), content)?;
        }
        Ok(())
    }
}

fn counter_path(dir: &Path, kind: ActionKind) -> PathBuf {
    dir.join(format!("{}.json", kind))
}

// =============================================================================
// Combined state
// =============================================================================

/// Why an action was deferred.
#[derive(Debug, Clone, PartialEq)]
pub enum Deferral {
    Window { wait: Duration },
    Quota { kind: ActionKind, wait: Duration },
}

impl Deferral {
    pub fn wait(&self) -> Duration {
        match self {
            Deferral::Window { wait } | Deferral::Quota { wait, .. } => *wait,
        }
    }
}

/// Both rate gates, consulted together by the executor.
#[derive(Debug)]
pub struct RateLimiterState {
    pub window: SlidingWindowLimiter,
    pub quotas: QuotaBook,
}

impl RateLimiterState {
    pub fn new(window: SlidingWindowLimiter, quotas: QuotaBook) -> Self {
        Self { window, quotas }
    }

    /// Check both gates without recording anything.
    pub fn check(&mut self, kind: ActionKind, now: Timestamp) -> Option<Deferral> {
        if !self.window.can_execute_at(now) {
            return Some(Deferral::Window {
                wait: self.window.wait_time_at(now),
            });
        }
        self.quotas
            .wait_for(kind, now)
            .map(|wait| Deferral::Quota { kind, wait })
    }

    /// Record a successful execution against both gates.
    pub fn record(&mut self, kind: ActionKind, now: Timestamp, file: &str) -> Result<()> {
        self.window.record_at(now);
        self.quotas.record(kind, now, file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Timestamp, secs: i64) -> Timestamp {
        base + chrono::Duration::seconds(secs)
    }

    fn fixed_base() -> Timestamp {
        Local.with_ymd_and_hms(2026, 3, 10, 9, 15, 0).unwrap()
    }

    // ---- SlidingWindowLimiter tests ----

    #[test]
    fn test_window_allows_up_to_max() {
        let base = fixed_base();
        let mut limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        for i in 0..3 {
            assert!(limiter.can_execute_at(at(base, i)));
            limiter.record_at(at(base, i));
        }
        assert!(!limiter.can_execute_at(at(base, 3)));
    }

    #[test]
    fn test_ten_per_hour_frees_a_slot_when_oldest_expires() {
        let base = fixed_base();
        let mut limiter = SlidingWindowLimiter::new(10, Duration::from_secs(3600));
        for i in 0..10 {
            assert!(limiter.can_execute_at(at(base, i * 60)));
            limiter.record_at(at(base, i * 60));
        }
        assert!(!limiter.can_execute_at(at(base, 600)));
        assert_eq!(limiter.wait_time_at(at(base, 600)), Duration::from_secs(3000));
        assert!(!limiter.can_execute_at(at(base, 3600)));

        assert!(limiter.can_execute_at(at(base, 3601)));
        limiter.record_at(at(base, 3601));
        // the second oldest still holds the window full
        assert!(!limiter.can_execute_at(at(base, 3602)));
    }

    #[test]
    fn test_window_wait_time_until_oldest_expires() {
        let base = fixed_base();
        let mut limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
        limiter.record_at(base);
        limiter.record_at(at(base, 10));
        assert_eq!(limiter.wait_time_at(at(base, 20)), Duration::from_secs(40));
        assert_eq!(limiter.wait_time_at(at(base, 61)), Duration::ZERO);
        assert!(limiter.can_execute_at(at(base, 61)));
    }

    #[test]
    fn test_window_entry_at_cutoff_still_counts() {
        let base = fixed_base();
        let mut limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        limiter.record_at(base);
        assert!(!limiter.can_execute_at(at(base, 60)));
        assert!(limiter.can_execute_at(at(base, 61)));
    }

    #[test]
    fn test_window_history_is_bounded() {
        let base = fixed_base();
        let mut limiter = SlidingWindowLimiter::new(2, Duration::from_secs(3600));
        for i in 0..5 {
            limiter.record_at(at(base, i));
        }
        assert_eq!(limiter.in_window(at(base, 5)), 2);
    }

    #[test]
    fn test_window_zero_max_never_allows() {
        let mut limiter = SlidingWindowLimiter::new(0, Duration::from_secs(60));
        assert!(!limiter.can_execute_at(fixed_base()));
        assert_eq!(limiter.wait_time_at(fixed_base()), Duration::ZERO);
    }

    // ---- ActionCounter tests ----

    #[test]
    fn test_counter_resets_on_new_hour_and_day() {
        let base = fixed_base();
        let mut counter = ActionCounter::default();
        counter.record(base, "A.md");
        counter.record(at(base, 60), "B.md");
        assert_eq!(counter.count_this_hour, 2);
        assert_eq!(counter.count_today, 2);

        counter.normalize(at(base, 3600));
        assert_eq!(counter.count_this_hour, 0);
        assert_eq!(counter.count_today, 2);

        counter.normalize(at(base, 86_400));
        assert_eq!(counter.count_today, 0);
        assert!(counter.history.is_empty());
        assert_eq!(counter.current_date, "2026-03-11");
    }

    #[test]
    fn test_counter_history_capped() {
        let base = fixed_base();
        let mut counter = ActionCounter::default();
        for i in 0..(COUNTER_HISTORY_LIMIT as i64 + 5) {
            counter.record(at(base, i), "x.md");
        }
        assert_eq!(counter.history.len(), COUNTER_HISTORY_LIMIT);
    }

    #[test]
    fn test_counter_wait_for_hour_and_day() {
        let base = fixed_base();
        let mut counter = ActionCounter::default();
        counter.record(base, "a.md");
        let hourly = counter.wait_for(QuotaLimits::new(1, 10), base).unwrap();
        assert_eq!(hourly, Duration::from_secs(45 * 60));

        let daily = counter.wait_for(QuotaLimits::new(10, 1), base).unwrap();
        assert!(daily > hourly);
        assert!(counter.wait_for(QuotaLimits::new(2, 2), base).is_none());
    }

    // ---- QuotaBook tests ----

    #[test]
    fn test_quota_book_blocks_when_hourly_exhausted() {
        let mut quotas = QuotasConfig::default();
        quotas.send_email = QuotaLimits::new(2, 10);
        let mut book = QuotaBook::in_memory(quotas);
        let now = fixed_base();

        book.record(ActionKind::SendEmail, now, "a.md").unwrap();
        assert!(book.wait_for(ActionKind::SendEmail, now).is_none());
        book.record(ActionKind::SendEmail, now, "b.md").unwrap();
        assert!(book.wait_for(ActionKind::SendEmail, now).is_some());
        // other kinds are independent
        assert!(book.wait_for(ActionKind::DraftEmail, now).is_none());
    }

    #[test]
    fn test_quota_book_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let now = Local::now();
        {
            let mut book = QuotaBook::persistent(QuotasConfig::default(), dir.path());
            book.record(ActionKind::PostSocial, now, "POST_1.md").unwrap();
        }
        assert!(dir.path().join("post_social.json").exists());

        let mut book = QuotaBook::persistent(QuotasConfig::default(), dir.path());
        let counter = book.counter(ActionKind::PostSocial, now);
        assert_eq!(counter.count_today, 1);
        assert_eq!(counter.history[0].file, "POST_1.md");
    }

    #[test]
    fn test_quota_book_corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("send_email.json"), "{ nope").unwrap();
        let mut book = QuotaBook::persistent(QuotasConfig::default(), dir.path());
        assert_eq!(book.counter(ActionKind::SendEmail, Local::now()).count_today, 0);
    }

    // ---- RateLimiterState tests ----

    #[test]
    fn test_state_prefers_window_deferral() {
        let now = fixed_base();
        let mut state = RateLimiterState::new(
            SlidingWindowLimiter::new(1, Duration::from_secs(3600)),
            QuotaBook::in_memory(QuotasConfig::default()),
        );
        assert!(state.check(ActionKind::SendEmail, now).is_none());
        state.record(ActionKind::SendEmail, now, "a.md").unwrap();

        let deferral = state.check(ActionKind::DraftEmail, at(now, 600)).unwrap();
        assert_eq!(
            deferral,
            Deferral::Window {
                wait: Duration::from_secs(3000)
            }
        );
        assert_eq!(deferral.wait(), Duration::from_secs(3000));
    }

    #[test]
    fn test_state_reports_quota_deferral() {
        let now = fixed_base();
        let mut quotas = QuotasConfig::default();
        quotas.post_social = QuotaLimits::new(1, 20);
        let mut state = RateLimiterState::new(
            SlidingWindowLimiter::new(10, Duration::from_secs(3600)),
            QuotaBook::in_memory(quotas),
        );
        state.record(ActionKind::PostSocial, now, "p.md").unwrap();
        assert!(matches!(
            state.check(ActionKind::PostSocial, now),
            Some(Deferral::Quota {
                kind: ActionKind::PostSocial,
                ..
            })
        ));
    }
}
