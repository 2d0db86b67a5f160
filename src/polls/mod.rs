//! Poll Domain
//!
//! Typed poll model plus the three pure stages every command goes through:
//! argument parsing, store response decoding and reply formatting.

pub mod decode;
pub mod format;
pub mod parse;

use std::collections::HashMap;

pub use decode::{DecodeError, Decoded, Procedure, RpcOutcome};
pub use parse::{parse_poll, parse_poll_id, parse_vote, ParseError, PollArgs, VoteArgs};

/// Marker prepended to every user-facing rejection.
pub const FAILURE_MARKER: &str = "❌";

/// Snapshot of a poll as returned by `get_poll`.
///
/// Never cached: one is decoded per request and dropped with the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poll {
    pub id: u64,
    pub question: String,
    /// Option labels in display order; option `i` is shown as `i + 1`.
    pub options: Vec<String>,
    /// Vote counts keyed by the stringified 1-based option index.
    pub votes: HashMap<String, u64>,
    pub active: bool,
}

impl Poll {
    /// Number of votes recorded for the 1-based option `index`.
    pub fn votes_for(&self, index: usize) -> u64 {
        self.votes.get(&index.to_string()).copied().unwrap_or(0)
    }
}

/// Prefix `message` with the failure marker.
pub fn rejection(message: impl std::fmt::Display) -> String {
    format!("{} {}", FAILURE_MARKER, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_votes_for_missing_key_is_zero() {
        let poll = Poll {
            id: 1,
            question: "Q".to_string(),
            options: vec!["A".to_string(), "B".to_string()],
            votes: HashMap::from([("2".to_string(), 5)]),
            active: true,
        };
        assert_eq!(poll.votes_for(1), 0);
        assert_eq!(poll.votes_for(2), 5);
    }

    #[test]
    fn test_rejection_prefix() {
        assert_eq!(rejection("poll is closed"), "❌ poll is closed");
    }
}
