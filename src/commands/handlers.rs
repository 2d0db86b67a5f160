//! Poll Command Handlers
//!
//! One handler per trigger. Each parses its text, makes at most one store
//! call and formats the reply.

use super::{CommandHandler, CommandRequest, CommandRouter, RouterError};
use crate::polls::format::{
    format_closed, format_created, format_deleted, format_poll, format_vote_recorded,
};
use crate::polls::{parse_poll, parse_poll_id, parse_vote, rejection, Decoded};
use crate::store::{PollStore, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

const EMPTY_QUESTION: &str =
    "Poll question cannot be empty. Usage: /poll \"Question\" \"Option1\" \"Option2\" ...";
const OPTIONS_REQUIRED: &str = "Options required";
const INVALID_POLL_ID: &str = "Invalid poll ID format";

const HELP_TEXT: &str = "🤖 *Poll Bot Help* 🤖\n\n\
*Available Commands:*\n\n\
1. */poll \"Question\" \"Option1\" \"Option2\" ...*\n   \
_Create a new poll_\n   \
Example: `/poll \"Favorite color?\" \"Red\" \"Blue\" \"Green\"`\n\n\
2. */vote <poll_id> <option_number>*\n   \
_Vote in an existing poll_\n   \
Example: `/vote 42 2` (votes for option 2 in poll 42)\n\n\
3. */get-poll <poll_id>*\n   \
_View poll results_\n   \
Example: `/get-poll 42`\n\n\
4. */close-poll <poll_id>*\n   \
_Close a poll (creator only)_\n   \
Example: `/close-poll 42`\n\n\
5. */delete-poll <poll_id>*\n   \
_Delete a poll (creator only)_\n   \
Example: `/delete-poll 42`\n\n\
6. */vote-bot-help*\n   \
_Show this help message_\n\n\
*Notes:*\n\
- Poll IDs are shown when you create a poll\n\
- Only poll creators can close or delete polls\n\
- Votes are channel-specific";

/// Render a decoded outcome, or the store's rejection.
fn reply<T>(decoded: Decoded<T>, render: impl FnOnce(T) -> String) -> String {
    match decoded {
        Decoded::Success(value) => render(value),
        Decoded::Rejected(message) => rejection(message),
    }
}

/// `/poll "Question" "Option1" "Option2" ...`
pub struct CreatePollHandler {
    store: PollStore,
}

#[async_trait]
impl CommandHandler for CreatePollHandler {
    async fn handle(&self, request: &CommandRequest) -> Result<String, StoreError> {
        info!(user_id = %request.user_id, channel_id = %request.channel_id, "Processing poll command");

        let args = parse_poll(&request.text);
        if args.question.is_empty() {
            return Ok(rejection(EMPTY_QUESTION));
        }
        if args.options.is_empty() {
            return Ok(rejection(OPTIONS_REQUIRED));
        }

        let decoded = self
            .store
            .create_poll(&request.user_id, &request.channel_id, &args.question, &args.options)
            .await?;
        Ok(reply(decoded, |poll_id| {
            info!(poll_id, "Poll created");
            format_created(poll_id, &args.question, &args.options)
        }))
    }
}

/// `/vote <poll_id> <option_number>`
pub struct VoteHandler {
    store: PollStore,
}

#[async_trait]
impl CommandHandler for VoteHandler {
    async fn handle(&self, request: &CommandRequest) -> Result<String, StoreError> {
        info!(user_id = %request.user_id, channel_id = %request.channel_id, "Processing vote command");

        let args = match parse_vote(&request.text) {
            Ok(args) => args,
            Err(e) => return Ok(rejection(e)),
        };

        let decoded = self
            .store
            .vote(args.poll_id, &request.user_id, args.option_index, &request.channel_id)
            .await?;
        Ok(reply(decoded, |()| {
            format_vote_recorded(args.poll_id, args.option_index)
        }))
    }
}

/// `/get-poll <poll_id>`
pub struct GetPollHandler {
    store: PollStore,
}

#[async_trait]
impl CommandHandler for GetPollHandler {
    async fn handle(&self, request: &CommandRequest) -> Result<String, StoreError> {
        let Ok(poll_id) = parse_poll_id(&request.text) else {
            return Ok(rejection(INVALID_POLL_ID));
        };
        info!(poll_id, channel_id = %request.channel_id, "Processing get-poll command");

        let decoded = self.store.get_poll(poll_id, &request.channel_id).await?;
        Ok(reply(decoded, |poll| format_poll(&poll)))
    }
}

/// `/close-poll <poll_id>`
pub struct ClosePollHandler {
    store: PollStore,
}

#[async_trait]
impl CommandHandler for ClosePollHandler {
    async fn handle(&self, request: &CommandRequest) -> Result<String, StoreError> {
        let Ok(poll_id) = parse_poll_id(&request.text) else {
            return Ok(rejection(INVALID_POLL_ID));
        };
        info!(poll_id, user_id = %request.user_id, "Processing close-poll command");

        let decoded = self
            .store
            .close_poll(poll_id, &request.user_id, &request.channel_id)
            .await?;
        Ok(reply(decoded, |()| format_closed(poll_id)))
    }
}

/// `/delete-poll <poll_id>`
pub struct DeletePollHandler {
    store: PollStore,
}

#[async_trait]
impl CommandHandler for DeletePollHandler {
    async fn handle(&self, request: &CommandRequest) -> Result<String, StoreError> {
        let Ok(poll_id) = parse_poll_id(&request.text) else {
            return Ok(rejection(INVALID_POLL_ID));
        };
        info!(poll_id, user_id = %request.user_id, "Processing delete-poll command");

        let decoded = self
            .store
            .delete_poll(poll_id, &request.user_id, &request.channel_id)
            .await?;
        Ok(reply(decoded, |()| format_deleted(poll_id)))
    }
}

pub struct HelpHandler;

#[async_trait]
impl CommandHandler for HelpHandler {
    async fn handle(&self, _request: &CommandRequest) -> Result<String, StoreError> {
        Ok(HELP_TEXT.to_string())
    }
}

/// Router with every poll trigger registered against `store`.
pub fn poll_commands(store: PollStore) -> Result<CommandRouter, RouterError> {
    let mut router = CommandRouter::new();

    router.register(
        "poll",
        "\"Question\" \"Option1\" \"Option2\"...",
        "Create a new poll",
        Arc::new(CreatePollHandler {
            store: store.clone(),
        }),
    )?;
    router.register(
        "vote",
        "<poll_id> <option_number>",
        "Vote in an existing poll",
        Arc::new(VoteHandler {
            store: store.clone(),
        }),
    )?;
    router.register(
        "get-poll",
        "<poll_id>",
        "View poll results",
        Arc::new(GetPollHandler {
            store: store.clone(),
        }),
    )?;
    router.register(
        "close-poll",
        "<poll_id>",
        "Close a poll (creator only)",
        Arc::new(ClosePollHandler {
            store: store.clone(),
        }),
    )?;
    router.register(
        "delete-poll",
        "<poll_id>",
        "Delete a poll (creator only)",
        Arc::new(DeletePollHandler { store }),
    )?;
    router.register(
        "vote-bot-help",
        "",
        "Show help for Vote Bot commands",
        Arc::new(HelpHandler),
    )?;

    Ok(router)
}
