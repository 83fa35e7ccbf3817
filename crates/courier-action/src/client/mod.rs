//! Action clients: the seam between the executor and the outside world.
//!
//! [`ProcessClient`] talks JSON-RPC to action servers over a child process's
//! stdio. [`DryRunClient`] performs nothing and reports success.

pub mod dry_run;
pub mod process;
pub mod rpc;

pub use dry_run::DryRunClient;
pub use process::ProcessClient;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ActionError;
use crate::types::RemoteCall;

/// Performs one remote call, bounded by `timeout`.
#[async_trait]
pub trait ActionClient: Send + Sync {
    async fn call(&self, call: &RemoteCall, timeout: Duration) -> Result<Value, ActionError>;

    /// True when calls have no external effect.
    fn is_dry_run(&self) -> bool {
        false
    }

    fn describe(&self, call: &RemoteCall) -> String {
        format!("{}.{}({})", call.server, call.procedure, call.arguments)
    }
}
