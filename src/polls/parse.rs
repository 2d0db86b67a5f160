//! Command Argument Parsing
//!
//! Turns the free text after a slash command into typed arguments.

use thiserror::Error;

/// Malformed command text. Always rendered back to the user, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid input format")]
    InvalidFormat,

    #[error("invalid poll ID")]
    InvalidPollId,

    #[error("invalid option index")]
    InvalidOptionIndex,
}

/// Arguments of `/poll "Question" "Option1" ...`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollArgs {
    pub question: String,
    pub options: Vec<String>,
}

/// Arguments of `/vote <poll_id> <option_number>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteArgs {
    pub poll_id: u64,
    pub option_index: i64,
}

/// Split `text` into its double-quoted tokens.
///
/// Text outside quotes is dropped. An unterminated quote ends tokenization
/// and whatever was collected so far is returned.
pub fn quoted_tokens(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find('"') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('"') else {
            break;
        };
        tokens.push(&after_open[..close]);
        rest = &after_open[close + 1..];
    }

    tokens
}

/// Parse poll creation text: first token is the question, the rest options.
pub fn parse_poll(text: &str) -> PollArgs {
    let mut tokens = quoted_tokens(text).into_iter().map(str::to_string);
    let question = tokens.next().unwrap_or_default();
    PollArgs {
        question,
        options: tokens.collect(),
    }
}

/// Parse vote text of exactly two whitespace-separated tokens.
pub fn parse_vote(text: &str) -> Result<VoteArgs, ParseError> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    let [poll_id, option_index] = parts.as_slice() else {
        return Err(ParseError::InvalidFormat);
    };

    let poll_id = poll_id
        .parse::<u64>()
        .map_err(|_| ParseError::InvalidPollId)?;
    let option_index = option_index
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidOptionIndex)?;

    Ok(VoteArgs {
        poll_id,
        option_index,
    })
}

/// Parse the single poll id taken by get/close/delete.
pub fn parse_poll_id(text: &str) -> Result<u64, ParseError> {
    text.trim()
        .parse::<u64>()
        .map_err(|_| ParseError::InvalidPollId)
}
