//! Client that performs nothing and reports success.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::ActionClient;
use crate::error::ActionError;
use crate::types::RemoteCall;

/// Client that only logs what it would have done.
#[derive(Debug, Default, Clone)]
pub struct DryRunClient;

impl DryRunClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ActionClient for DryRunClient {
    async fn call(&self, call: &RemoteCall, _timeout: Duration) -> Result<Value, ActionError> {
        tracing::info!(call = %self.describe(call), "[DRY RUN] Skipping remote call");
        Ok(json!({
            "success": true,
            "dry_run": true,
            "tool": call.procedure,
            "arguments": call.arguments,
        }))
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
