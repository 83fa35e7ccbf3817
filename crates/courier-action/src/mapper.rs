//! Turns an approval request into a validated remote call.
//!
//! Header field names follow what the approval files carry
//! (`email_to`, `email_subject`, `search_query`, `draft_id`, ...).

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::ActionError;
use crate::types::{ActionKind, ApprovalRequest, RemoteCall, ServerKind};

pub const DEFAULT_SUBJECT: &str = "No Subject";
pub const DEFAULT_MAX_RESULTS: u32 = 10;
pub const MAX_SEARCH_RESULTS: u32 = 100;
/// Hashtags beyond this are rejected outright.
pub const HASHTAG_LIMIT: usize = 30;
/// Hashtags beyond this only draw a warning.
pub const HASHTAG_WARNING: usize = 5;
pub const URL_WARNING: usize = 3;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid regex")
    })
}

fn hashtag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#\w+").expect("valid regex"))
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("valid regex"))
}

pub fn is_valid_email(address: &str) -> bool {
    email_regex().is_match(address)
}

/// Saved social drafts, one JSON file per draft id.
#[derive(Debug, Clone)]
pub struct DraftStore {
    dir: PathBuf,
}

impl DraftStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The `content` field of draft `id`, if the draft exists and is readable.
    pub fn content(&self, id: &str) -> Option<String> {
        if id.contains(['/', '\\']) || id.contains("..") {
            return None;
        }
        let path = self.dir.join(format!("{}.json", id));
        let raw = std::fs::read_to_string(path).ok()?;
        let draft: Value = serde_json::from_str(&raw).ok()?;
        draft.get("content")?.as_str().map(str::to_string)
    }
}

/// Validates approval requests and builds the matching remote call.
#[derive(Debug, Clone)]
pub struct ActionMapper {
    drafts: DraftStore,
    max_post_length: usize,
}

impl ActionMapper {
    pub fn new(drafts: DraftStore, max_post_length: usize) -> Self {
        Self {
            drafts,
            max_post_length,
        }
    }

    pub fn drafts(&self) -> &DraftStore {
        &self.drafts
    }

    pub fn map(&self, request: &ApprovalRequest) -> Result<RemoteCall, ActionError> {
        match request.kind {
            ActionKind::SendEmail => self.map_email(request, "send_email", true),
            ActionKind::DraftEmail => self.map_email(request, "draft_email", false),
            ActionKind::SearchEmails => self.map_search(request),
            ActionKind::PostSocial => self.map_social(request),
        }
    }

    fn map_email(
        &self,
        request: &ApprovalRequest,
        procedure: &str,
        allow_cc: bool,
    ) -> Result<RemoteCall, ActionError> {
        let to = request
            .field("email_to")
            .ok_or_else(|| ActionError::Validation("Missing recipient (email_to)".to_string()))?;
        if !is_valid_email(&to) {
            return Err(ActionError::Validation(format!("Invalid email address: {}", to)));
        }

        let mut args = Map::new();
        args.insert("to".to_string(), json!(to));
        args.insert(
            "subject".to_string(),
            json!(request.field("email_subject").unwrap_or_else(|| DEFAULT_SUBJECT.to_string())),
        );
        args.insert("body".to_string(), json!(request.body().trim()));

        if let Some(cc) = request.field("email_cc").filter(|_| allow_cc) {
            let addresses: Vec<&str> = cc.split(',').map(str::trim).filter(|a| !a.is_empty()).collect();
            if let Some(bad) = addresses.iter().find(|a| !is_valid_email(a)) {
                return Err(ActionError::Validation(format!("Invalid email address: {}", bad)));
            }
            if !addresses.is_empty() {
                args.insert("cc".to_string(), json!(addresses.join(", ")));
            }
        }

        Ok(RemoteCall::new(ServerKind::Email, procedure, Value::Object(args)))
    }

    fn map_search(&self, request: &ApprovalRequest) -> Result<RemoteCall, ActionError> {
        let query = request
            .field("search_query")
            .unwrap_or_else(|| request.body().trim().to_string());
        if query.trim().is_empty() {
            return Err(ActionError::Validation("Search query cannot be empty".to_string()));
        }

        let max_results = match request.field("max_results") {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                ActionError::Validation(format!("max_results must be a positive integer, got '{}'", raw))
            })?,
            None => DEFAULT_MAX_RESULTS,
        };

        Ok(RemoteCall::new(
            ServerKind::Email,
            "search_emails",
            json!({
                "query": query,
                "max_results": max_results.clamp(1, MAX_SEARCH_RESULTS),
            }),
        ))
    }

    /// Social content: the referenced draft's content when one resolves,
    /// otherwise the request body.
    pub fn social_content(&self, request: &ApprovalRequest) -> String {
        request
            .field("draft_id")
            .and_then(|id| self.drafts.content(&id))
            .unwrap_or_else(|| request.body().trim().to_string())
    }

    fn map_social(&self, request: &ApprovalRequest) -> Result<RemoteCall, ActionError> {
        let content = self.social_content(request);
        let max_length = match request.field("max_length") {
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                ActionError::Validation(format!("max_length must be a positive integer, got '{}'", raw))
            })?,
            None => self.max_post_length,
        };
        validate_social_content(&content, max_length)?;

        let mut args = Map::new();
        args.insert("content".to_string(), json!(content));
        if let Some(platform) = request.field("platform") {
            args.insert("platform".to_string(), json!(platform));
        }
        if let Some(schedule_time) = request.field("schedule_time") {
            args.insert("schedule_time".to_string(), json!(schedule_time));
        }
        if let Some(tags) = request.field("tags") {
            let tags: Vec<&str> = tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect();
            if !tags.is_empty() {
                args.insert("tags".to_string(), json!(tags));
            }
        }
        if let Some(draft_id) = request.field("draft_id") {
            args.insert("draft_id".to_string(), json!(draft_id));
        }

        Ok(RemoteCall::new(ServerKind::Social, "create_social_post", Value::Object(args)))
    }
}

/// Hard limits on social content. Soft limits only log a warning.
pub fn validate_social_content(content: &str, max_length: usize) -> Result<(), ActionError> {
    if content.trim().is_empty() {
        return Err(ActionError::Validation("Content cannot be empty".to_string()));
    }
    let length = content.chars().count();
    if length > max_length {
        return Err(ActionError::Validation(format!(
            "Content exceeds maximum length ({} > {})",
            length, max_length
        )));
    }

    let hashtags = hashtag_regex().find_iter(content).count();
    if hashtags > HASHTAG_LIMIT {
        return Err(ActionError::Validation(format!(
            "Too many hashtags ({} > {})",
            hashtags, HASHTAG_LIMIT
        )));
    }
    if hashtags > HASHTAG_WARNING {
        warn!(hashtags, "Post uses many hashtags");
    }
    let urls = url_regex().find_iter(content).count();
    if urls > URL_WARNING {
        warn!(urls, "Post contains many links");
    }
    Ok(())
}
