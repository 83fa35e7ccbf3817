//! Action client that runs each server as a child process.
//!
//! Non-JSON lines on stdout (banners, logging) are skipped; the response is
//! the first line whose id matches the request.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use courier_core::config::{ServerCommand, ServersConfig};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::client::rpc::{Request, Response};
use crate::client::ActionClient;
use crate::error::ActionError;
use crate::types::{RemoteCall, ServerKind};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide, strictly increasing JSON-RPC request id.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// Launches the configured action server for each call, writes one
/// JSON-RPC request line to its stdin, closes it, and reads the response
/// from stdout.
///
/// The child is killed if the deadline expires first.
pub struct ProcessClient {
    servers: HashMap<ServerKind, ServerCommand>,
}

impl ProcessClient {
    pub fn new(config: &ServersConfig) -> Self {
        let mut servers = HashMap::new();
        if let Some(email) = &config.email {
            servers.insert(ServerKind::Email, email.clone());
        }
        if let Some(social) = &config.social {
            servers.insert(ServerKind::Social, social.clone());
        }
        Self { servers }
    }

    async fn exchange(&self, command: &ServerCommand, call: &RemoteCall) -> Result<Value, ActionError> {
        let id = next_request_id();
        let line = Request::tools_call(id, &call.procedure, &call.arguments).to_line()?;

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ActionError::RemoteFailure(format!("Failed to start {}: {}", command.program, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A server that exits early surfaces through its exit status below.
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                debug!(error = %e, "Action server closed stdin early");
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ActionError::RemoteFailure(format!("Failed to read response: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ActionError::RemoteFailure(format!(
                "{} exited with {}: {}",
                command.program,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let response = stdout
            .lines()
            .filter_map(Response::parse_line)
            .find(|r| r.id_matches(id))
            .ok_or_else(|| {
                ActionError::RemoteFailure(format!("No response for request {}", id))
            })?;
        response.into_result()
    }
}

#[async_trait]
impl ActionClient for ProcessClient {
    async fn call(&self, call: &RemoteCall, timeout: Duration) -> Result<Value, ActionError> {
        let command = self.servers.get(&call.server).ok_or_else(|| {
            ActionError::RemoteFailure(format!("No {} action server configured", call.server))
        })?;
        debug!(call = %self.describe(call), program = %command.program, "Calling action server");

        match tokio::time::timeout(timeout, self.exchange(command, call)).await {
            Ok(result) => result,
            Err(_) => Err(ActionError::Timeout(timeout)),
        }
    }
}
