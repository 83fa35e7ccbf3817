//! JSON-RPC 2.0 messages exchanged with action servers, one per line.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ActionError;

#[derive(Debug, Clone, Serialize)]
pub struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> Request<'a> {
    pub fn tools_call(id: u64, name: &'a str, arguments: &Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: "tools/call",
            params: json!({ "name": name, "arguments": arguments }),
        }
    }

    pub fn to_line(&self) -> Result<String, ActionError> {
        let mut line = serde_json::to_string(self)
            .map_err(|e| ActionError::RemoteFailure(format!("Failed to encode request: {}", e)))?;
        line.push('\n');
        Ok(line)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl Response {
    /// Parse one output line. Lines that are not JSON-RPC responses (logs,
    /// notifications) yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        let response: Response = serde_json::from_str(trimmed).ok()?;
        response.id.as_ref()?;
        Some(response)
    }

    pub fn id_matches(&self, id: u64) -> bool {
        self.id.as_ref().and_then(Value::as_u64) == Some(id)
    }

    /// The tool result, or the failure it describes.
    pub fn into_result(self) -> Result<Value, ActionError> {
        if let Some(err) = self.error {
            return Err(ActionError::RemoteFailure(format!(
                "{} (code {})",
                err.message, err.code
            )));
        }
        let result = self.result.unwrap_or(Value::Null);
        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            return Err(ActionError::RemoteFailure(content_text(&result)));
        }
        Ok(result)
    }
}

/// Concatenated text blocks of a tool result's `content` list.
pub fn content_text(result: &Value) -> String {
    let text: Vec<&str> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if text.is_empty() {
        "tool reported an error".to_string()
    } else {
        text.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tools_call_line() {
        let args = json!({"to": "a@b.co"});
        let line = Request::tools_call(7, "send_email", &args).to_line().unwrap();
        assert!(line.ends_with('\n'));
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "tools/call",
                "params": {"name": "send_email", "arguments": {"to": "a@b.co"}},
            })
        );
    }

    #[test]
    fn test_parse_line_skips_noise() {
        assert!(Response::parse_line("Email server ready").is_none());
        assert!(Response::parse_line(r#"{"jsonrpc":"2.0","method":"log"}"#).is_none());
        let response = Response::parse_line(r#"{"jsonrpc":"2.0","id":3,"result":{}}"#).unwrap();
        assert!(response.id_matches(3));
        assert!(!response.id_matches(4));
    }

    #[test]
    fn test_error_response_is_remote_failure() {
        let response =
            Response::parse_line(r#"{"id":1,"error":{"code":-32601,"message":"no such tool"}}"#).unwrap();
        let err = response.into_result().unwrap_err();
        assert!(matches!(err, ActionError::RemoteFailure(ref m) if m.contains("no such tool")));
    }

    #[test]
    fn test_is_error_result_is_remote_failure() {
        let response = Response::parse_line(
            r#"{"id":1,"result":{"isError":true,"content":[{"type":"text","text":"SMTP refused"}]}}"#,
        )
        .unwrap();
        let err = response.into_result().unwrap_err();
        assert_eq!(err.to_string(), "Remote action failed: SMTP refused");
    }

    #[test]
    fn test_success_result() {
        let response = Response::parse_line(
            r#"{"id":1,"result":{"content":[{"type":"text","text":"sent"}]}}"#,
        )
        .unwrap();
        let result = response.into_result().unwrap();
        assert_eq!(content_text(&result), "sent");
    }
}
