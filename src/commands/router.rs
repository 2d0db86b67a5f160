//! Command Router
//!
//! Trigger table built once at startup, and reconciliation of that table with
//! the slash commands Mattermost already has for the team.

use super::{CommandHandler, CommandRequest, Dispatch};
use crate::channels::mattermost::{MattermostError, SlashCommand, SlashCommandApi};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("Trigger already registered: {0}")]
    DuplicateTrigger(String),

    #[error("Invalid trigger '{0}': must be non-empty, without slash or whitespace")]
    InvalidTrigger(String),
}

/// Where registered commands point and who owns them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationTarget {
    pub team_id: String,
    pub creator_id: String,
    pub callback_url: String,
}

/// What reconciliation did for one trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Created { trigger: String, id: String },
    Updated { trigger: String, id: String },
}

struct Route {
    hint: String,
    description: String,
    handler: Arc<dyn CommandHandler>,
}

/// Maps bare trigger names to handlers.
#[derive(Default)]
pub struct CommandRouter {
    routes: BTreeMap<String, Route>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler with its autocomplete hint and description.
    pub fn register(
        &mut self,
        trigger: &str,
        hint: &str,
        description: &str,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<(), RouterError> {
        if trigger.is_empty() || trigger.starts_with('/') || trigger.contains(char::is_whitespace) {
            return Err(RouterError::InvalidTrigger(trigger.to_string()));
        }
        if self.routes.contains_key(trigger) {
            return Err(RouterError::DuplicateTrigger(trigger.to_string()));
        }

        self.routes.insert(
            trigger.to_string(),
            Route {
                hint: hint.to_string(),
                description: description.to_string(),
                handler,
            },
        );
        debug!(trigger, "Registered command");
        Ok(())
    }

    pub fn triggers(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route a request by its command name, minus one leading slash.
    pub async fn dispatch(&self, request: &CommandRequest) -> Dispatch {
        let trigger = request
            .command
            .strip_prefix('/')
            .unwrap_or(request.command.as_str());

        let Some(route) = self.routes.get(trigger) else {
            return Dispatch::NotFound(trigger.to_string());
        };

        match route.handler.handle(request).await {
            Ok(text) => Dispatch::Reply(text),
            Err(e) => Dispatch::Failed(e),
        }
    }

    /// The registration Mattermost should hold for `trigger`.
    fn slash_command(&self, trigger: &str, route: &Route, target: &RegistrationTarget) -> SlashCommand {
        SlashCommand {
            id: String::new(),
            team_id: target.team_id.clone(),
            trigger: trigger.to_string(),
            method: "P".to_string(),
            creator_id: target.creator_id.clone(),
            auto_complete: true,
            auto_complete_desc: route.description.clone(),
            auto_complete_hint: route.hint.clone(),
            display_name: format!("{} Command", title_case(trigger)),
            description: format!("Execute {} command", trigger),
            url: target.callback_url.clone(),
        }
    }

    /// Create or update one platform command per trigger.
    ///
    /// Existing commands are matched by trigger and keep their id, so running
    /// this repeatedly never produces duplicates. The first platform error
    /// aborts the pass.
    pub async fn reconcile(
        &self,
        api: &dyn SlashCommandApi,
        target: &RegistrationTarget,
    ) -> Result<Vec<Reconciled>, MattermostError> {
        let mut results = Vec::with_capacity(self.routes.len());

        for (trigger, route) in &self.routes {
            let mut command = self.slash_command(trigger, route, target);
            let existing = api.list_commands(&target.team_id).await?;

            let outcome = match existing.into_iter().find(|c| &c.trigger == trigger) {
                Some(found) => {
                    command.id = found.id;
                    let updated = api.update_command(&command).await?;
                    info!(trigger = %trigger, id = %updated.id, "Slash command updated");
                    Reconciled::Updated {
                        trigger: trigger.clone(),
                        id: updated.id,
                    }
                }
                None => {
                    let created = api.create_command(&command).await?;
                    info!(trigger = %trigger, id = %created.id, "Slash command created");
                    Reconciled::Created {
                        trigger: trigger.clone(),
                        id: created.id,
                    }
                }
            };
            results.push(outcome);
        }

        Ok(results)
    }
}

/// Upper-case the first letter of every word; any character other than a
/// letter, digit or underscore separates words.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !(c.is_alphanumeric() || c == '_');
    }
    out
}
