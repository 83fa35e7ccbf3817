//! Keyword rules for categorizing task bodies.
//!
//! Matching is a case-insensitive substring test, so "now" also matches
//! "known". Rules are checked in order and the first match wins.

use crate::types::{Category, Priority};

pub const SENSITIVE_KEYWORDS: &[&str] = &[
    "email", "message", "whatsapp", "contact", "payment", "money", "bank", "transfer", "send",
    "reply", "respond", "purchase", "buy", "delete", "remove", "cancel", "refund",
];

pub const AUTO_COMPLETE_KEYWORDS: &[&str] = &[
    "reminder", "note", "fyi", "read later", "bookmark", "save", "archive",
];

pub const URGENT_KEYWORDS: &[&str] = &[
    "urgent", "asap", "critical", "emergency", "deadline", "important", "priority", "immediate",
    "today", "now", "escalate",
];

pub const LOW_PRIORITY_KEYWORDS: &[&str] = &[
    "reminder", "note", "fyi", "info", "read", "review", "check", "later", "when possible",
    "low priority", "optional",
];

/// Category and priority assigned to one task body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    pub priority: Priority,
}

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| haystack.contains(k))
}

pub fn classify(body: &str) -> Classification {
    let text = body.to_lowercase();
    let urgent = contains_any(&text, URGENT_KEYWORDS);
    let low = contains_any(&text, LOW_PRIORITY_KEYWORDS);

    let category = if contains_any(&text, SENSITIVE_KEYWORDS) {
        Category::ApprovalRequired
    } else if contains_any(&text, AUTO_COMPLETE_KEYWORDS) {
        Category::AutoComplete
    } else if urgent {
        Category::HighPriority
    } else if low {
        Category::LowPriority
    } else {
        Category::Normal
    };

    let priority = if urgent {
        Priority::High
    } else if low {
        Priority::Low
    } else {
        Priority::Normal
    };

    Classification { category, priority }
}
