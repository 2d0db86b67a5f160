//! Mattermost Client
//!
//! REST v4 client covering what the poll bot needs from the server: resolving
//! its own user and team, and managing the team's custom slash commands.

use crate::config::MattermostConfig;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

/// Mattermost errors
#[derive(Debug, Error)]
pub enum MattermostError {
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Custom slash command as stored by Mattermost.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlashCommand {
    /// Server-assigned id; empty until created
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub team_id: String,
    pub trigger: String,
    /// `P` for POST, `G` for GET
    pub method: String,
    pub creator_id: String,
    pub auto_complete: bool,
    pub auto_complete_desc: String,
    pub auto_complete_hint: String,
    pub display_name: String,
    pub description: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Team {
    pub id: String,
    pub name: String,
}

/// Error body returned by the API on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Slash-command management, the part of the API registration depends on.
#[async_trait]
pub trait SlashCommandApi: Send + Sync {
    async fn list_commands(&self, team_id: &str) -> Result<Vec<SlashCommand>, MattermostError>;

    async fn create_command(&self, command: &SlashCommand) -> Result<SlashCommand, MattermostError>;

    async fn update_command(&self, command: &SlashCommand) -> Result<SlashCommand, MattermostError>;
}

/// Mattermost REST client
#[derive(Debug, Clone)]
pub struct MattermostClient {
    config: MattermostConfig,
    client: reqwest::Client,
    /// `<server>/api/v4/`
    api_base: Url,
}

impl MattermostClient {
    /// Create a client for the configured server
    pub fn new(config: MattermostConfig) -> Result<Self, MattermostError> {
        let mut base = Url::parse(&config.server_url)
            .map_err(|e| MattermostError::InvalidUrl(format!("{}: {}", config.server_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let api_base = base
            .join("api/v4/")
            .map_err(|e| MattermostError::InvalidUrl(e.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| MattermostError::Network(e.to_string()))?;

        Ok(Self {
            config,
            client,
            api_base,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, MattermostError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| MattermostError::InvalidUrl(self.config.server_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.config.token)
    }

    /// Send a request to the Mattermost API
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, MattermostError> {
        let response = request
            .send()
            .await
            .map_err(|e| MattermostError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.message)
                .unwrap_or(text);
            return Err(MattermostError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| MattermostError::Parse(e.to_string()))
    }

    /// Look up a user by username, used to identify the bot account.
    pub async fn get_user_by_username(&self, username: &str) -> Result<User, MattermostError> {
        let url = self.endpoint(&["users", "username", username])?;
        let user: User = self.send(self.request(Method::GET, url)).await?;
        info!(username = %user.username, user_id = %user.id, "Authenticated with Mattermost");
        Ok(user)
    }

    pub async fn get_team_by_name(&self, name: &str) -> Result<Team, MattermostError> {
        let url = self.endpoint(&["teams", "name", name])?;
        let team: Team = self.send(self.request(Method::GET, url)).await?;
        info!(team = %team.name, team_id = %team.id, "Found team");
        Ok(team)
    }
}

#[async_trait]
impl SlashCommandApi for MattermostClient {
    async fn list_commands(&self, team_id: &str) -> Result<Vec<SlashCommand>, MattermostError> {
        let mut url = self.endpoint(&["commands"])?;
        url.query_pairs_mut()
            .append_pair("team_id", team_id)
            .append_pair("custom_only", "false");
        self.send(self.request(Method::GET, url)).await
    }

    async fn create_command(&self, command: &SlashCommand) -> Result<SlashCommand, MattermostError> {
        debug!(trigger = %command.trigger, "Creating slash command");
        let url = self.endpoint(&["commands"])?;
        self.send(self.request(Method::POST, url).json(command)).await
    }

    async fn update_command(&self, command: &SlashCommand) -> Result<SlashCommand, MattermostError> {
        debug!(trigger = %command.trigger, id = %command.id, "Updating slash command");
        let url = self.endpoint(&["commands", &command.id])?;
        self.send(self.request(Method::PUT, url).json(command)).await
    }
}
