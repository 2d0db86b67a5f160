//! Reply Formatting
//!
//! Pure rendering of decoded results into Mattermost markdown.

use super::Poll;
use std::fmt::Write;

/// Render a poll with its per-option vote counts.
pub fn format_poll(poll: &Poll) -> String {
    let status = if poll.active {
        "✅ Active"
    } else {
        "❌ Closed"
    };

    let mut out = String::new();
    let _ = writeln!(out, "📊 Poll (ID `{}`)", poll.id);
    let _ = writeln!(out, "{}", status);
    out.push('\n');
    let _ = writeln!(out, "`{}`", poll.question);

    for (i, option) in poll.options.iter().enumerate() {
        let _ = writeln!(out, "{}. `{}` - {} votes", i + 1, option, poll.votes_for(i + 1));
    }

    out
}

/// Numbered option list, one line per option.
pub fn format_options(options: &[String]) -> String {
    let mut out = String::new();
    for (i, option) in options.iter().enumerate() {
        let _ = writeln!(out, "{}. `{}`", i + 1, option);
    }
    out
}

/// Confirmation for a freshly created poll.
pub fn format_created(poll_id: u64, question: &str, options: &[String]) -> String {
    format!(
        "🗳️ *Poll Created* (ID: `{}`)\n\n**`{}`**\n{}\n",
        poll_id,
        question,
        format_options(options)
    )
}

pub fn format_vote_recorded(poll_id: u64, option_index: i64) -> String {
    format!(
        "Successfully voted for option {} in the poll {}",
        option_index, poll_id
    )
}

pub fn format_closed(poll_id: u64) -> String {
    format!("Poll (ID `{}`) closed", poll_id)
}

pub fn format_deleted(poll_id: u64) -> String {
    format!("Poll (ID `{}`) deleted", poll_id)
}
