//! Chat platform clients.

pub mod mattermost;
