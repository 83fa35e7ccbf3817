//! Plan records: a checklist written alongside each classified task.

use crate::codec::{self, Headers};
use crate::types::{Category, TaskId, Timestamp};

use super::rules::Classification;

/// Characters of the task body quoted in the plan summary.
const SUMMARY_CHARS: usize = 300;

fn steps(category: Category) -> &'static [&'static str] {
    match category {
        Category::AutoComplete => &[
            "- [x] Task received and categorized",
            "- [x] Identified as auto-completable",
            "- [x] Moved to Done automatically",
            "- [x] Task archived",
        ],
        Category::HighPriority => &[
            "- [ ] URGENT: Analyze task requirements immediately",
            "- [ ] Identify critical dependencies",
            "- [ ] Execute high-priority actions",
            "- [ ] Verify critical outcomes",
            "- [ ] Notify stakeholders",
            "- [ ] Document results",
        ],
        Category::ApprovalRequired => &[
            "- [ ] Analyze sensitive action requirements",
            "- [ ] Prepare approval request",
            "- [ ] Wait for human approval",
            "- [ ] Execute approved actions",
            "- [ ] Verify outcomes",
            "- [ ] Document and log actions",
        ],
        Category::LowPriority | Category::Normal => &[
            "- [ ] Analyze task requirements",
            "- [ ] Gather necessary information",
            "- [ ] Break down task into subtasks",
            "- [ ] Execute primary actions",
            "- [ ] Verify results",
            "- [ ] Document outcomes",
            "- [ ] Update task status",
        ],
    }
}

fn note(category: Category) -> &'static str {
    match category {
        Category::AutoComplete => "- AUTO-COMPLETED: simple task, no action required",
        Category::HighPriority => "- HIGH PRIORITY: requires immediate attention",
        Category::ApprovalRequired => "- REQUIRES HUMAN APPROVAL before execution",
        Category::LowPriority => "- Low priority task",
        Category::Normal => "- Standard priority task",
    }
}

fn summary(body: &str) -> String {
    let body = body.trim();
    let mut out: String = body.chars().take(SUMMARY_CHARS).collect();
    if body.chars().count() > SUMMARY_CHARS {
        out.push_str("...");
    }
    out
}

/// Render the plan for task `id`.
pub fn render(id: &TaskId, body: &str, classification: Classification, now: Timestamp) -> String {
    let Classification { category, priority } = classification;
    let auto = category == Category::AutoComplete;
    let created = now.to_rfc3339();

    let mut headers = Headers::new();
    headers.insert("taskFile", id.file_name());
    headers.insert("createdAt", created.clone());
    headers.insert("category", category.to_string());
    headers.insert("priority", priority.to_string());
    headers.insert("requiresApproval", (category == Category::ApprovalRequired).to_string());
    headers.insert("autoCompleted", auto.to_string());
    headers.insert("status", if auto { "completed" } else { "pending" });

    let log_line = if auto {
        format!("Auto-completed at {}", created)
    } else {
        "_Will be populated during execution_".to_string()
    };

    let body = format!(
        "\n# Execution Plan: {id}\n\n\
         **Priority:** {priority}\n\
         **Category:** {category}\n\n\
         ## Task Summary\n{summary}\n\n\
         ## Execution Steps\n{steps}\n\n\
         ## Notes\n- This plan was automatically generated\n{note}\n\n\
         ## Execution Log\n{log_line}\n",
        id = id,
        priority = priority.to_string().to_uppercase(),
        category = category,
        summary = summary(body),
        steps = steps(category).join("\n"),
        note = note(category),
        log_line = log_line,
    );

    codec::serialize(&headers, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;
    use chrono::Local;

    #[test]
    fn test_plan_header_and_steps() {
        let classification = Classification {
            category: Category::HighPriority,
            priority: Priority::High,
        };
        let plan = render(&TaskId::new("EMAIL_1"), "Server down", classification, Local::now());
        let record = codec::parse(&plan);
        assert_eq!(record.headers.get("taskFile"), Some("EMAIL_1.md"));
        assert_eq!(record.headers.get("category"), Some("high_priority"));
        assert_eq!(record.headers.get("requiresApproval"), Some("false"));
        assert_eq!(record.headers.get("status"), Some("pending"));
        assert!(record.body.contains("URGENT: Analyze task requirements immediately"));
        assert!(record.body.contains("**Priority:** HIGH"));
        assert!(record.body.contains("Server down"));
    }

    #[test]
    fn test_auto_complete_plan_is_checked_off() {
        let classification = Classification {
            category: Category::AutoComplete,
            priority: Priority::Low,
        };
        let plan = render(&TaskId::new("N"), "fyi", classification, Local::now());
        let record = codec::parse(&plan);
        assert_eq!(record.headers.get("status"), Some("completed"));
        assert_eq!(record.headers.get("autoCompleted"), Some("true"));
        assert!(!record.body.contains("- [ ]"));
        assert!(record.body.contains("Auto-completed at"));
    }

    #[test]
    fn test_summary_truncated() {
        let long = "x".repeat(400);
        let s = summary(&long);
        assert_eq!(s.chars().count(), SUMMARY_CHARS + 3);
        assert!(s.ends_with("..."));
        assert_eq!(summary("short"), "short");
    }
}
