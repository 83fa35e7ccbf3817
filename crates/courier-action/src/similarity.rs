//! Token-set similarity used to catch duplicate social posts.

use std::collections::HashSet;

/// Scores strictly above this are reported as near-duplicates.
pub const NEAR_DUPLICATE_THRESHOLD: f64 = 0.8;

/// Outcome of comparing a candidate post with one prior post.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Distinct,
    NearDuplicate(f64),
    Exact,
}

/// Lowercase and collapse every run of whitespace to a single space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Jaccard similarity of the lowercase whitespace token sets.
///
/// Two empty texts score 0.0.
pub fn score(a: &str, b: &str) -> f64 {
    let left = tokens(a);
    let right = tokens(b);
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = left.intersection(&right).count();
    intersection as f64 / union as f64
}

/// Compare `candidate` with a previously published text.
pub fn compare(candidate: &str, prior: &str) -> Verdict {
    let normalized = normalize(candidate);
    if !normalized.is_empty() && normalized == normalize(prior) {
        return Verdict::Exact;
    }
    let s = score(candidate, prior);
    if s > NEAR_DUPLICATE_THRESHOLD {
        Verdict::NearDuplicate(s)
    } else {
        Verdict::Distinct
    }
}
