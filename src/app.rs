//! Application Context
//!
//! Startup runs strictly in order: poll store, Mattermost identity, command
//! table, command registration, then the webhook server. The first failure
//! aborts startup.

use crate::channels::mattermost::{MattermostClient, MattermostError};
use crate::commands::{poll_commands, CommandRouter, Reconciled, RegistrationTarget, RouterError};
use crate::config::Config;
use crate::server::{self, ServerError};
use crate::store::{PollStore, RpcError, TarantoolClient};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Poll store unavailable: {0}")]
    Store(#[from] RpcError),

    #[error("Mattermost: {0}")]
    Mattermost(#[from] MattermostError),

    #[error("Command table: {0}")]
    Router(#[from] RouterError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Everything a running bot needs, built once.
pub struct App {
    config: Config,
    commands: Arc<CommandRouter>,
}

impl App {
    pub async fn initialize(config: Config) -> Result<Self, StartupError> {
        let rpc = TarantoolClient::connect(config.store.clone()).await?;
        let store = PollStore::new(Arc::new(rpc));

        if config.mattermost.token.is_empty() {
            warn!("MM_TOKEN is empty; Mattermost requests will be unauthenticated");
        }
        let mattermost = MattermostClient::new(config.mattermost.clone())?;
        let user = mattermost
            .get_user_by_username(&config.mattermost.username)
            .await?;
        let team = mattermost.get_team_by_name(&config.mattermost.team).await?;

        let commands = poll_commands(store)?;
        let target = RegistrationTarget {
            team_id: team.id,
            creator_id: user.id,
            callback_url: config.server.callback_url(),
        };

        let results = commands.reconcile(&mattermost, &target).await?;
        let created = results
            .iter()
            .filter(|r| matches!(r, Reconciled::Created { .. }))
            .count();
        info!(
            created,
            updated = results.len() - created,
            callback_url = %target.callback_url,
            "Slash commands registered"
        );

        Ok(Self {
            config,
            commands: Arc::new(commands),
        })
    }

    pub fn commands(&self) -> Arc<CommandRouter> {
        self.commands.clone()
    }

    /// Serve webhooks until shutdown.
    pub async fn run(self) -> Result<(), StartupError> {
        server::serve(self.config.server.bind_addr(), self.commands).await?;
        Ok(())
    }
}
