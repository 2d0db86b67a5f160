//! Slash Commands
//!
//! Webhook payload model, the handler trait and the trigger router.

pub mod handlers;
pub mod router;

use crate::store::StoreError;
use async_trait::async_trait;
use serde::Deserialize;

pub use handlers::poll_commands;
pub use router::{CommandRouter, Reconciled, RegistrationTarget, RouterError};

/// One slash-command invocation as posted by Mattermost.
///
/// Missing form fields decode as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CommandRequest {
    pub token: String,
    pub team_id: String,
    pub team_domain: String,
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub user_name: String,
    /// Trigger as typed, usually with its leading slash
    pub command: String,
    pub text: String,
    pub response_url: String,
    pub trigger_id: String,
}

/// Handles one trigger.
///
/// `Ok` covers both successful replies and user-facing rejections; `Err` is
/// reserved for store calls that produced no usable answer.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, request: &CommandRequest) -> Result<String, StoreError>;
}

/// Result of routing a request.
#[derive(Debug)]
pub enum Dispatch {
    Reply(String),
    /// No handler for this trigger
    NotFound(String),
    Failed(StoreError),
}
