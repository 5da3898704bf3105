//! Replaying persisted turns into model-facing history.

use faceagent_core::message::Message;
use faceagent_core::store::{ChatTurn, TurnRole};

/// Convert stored turns (oldest first) into messages.
///
/// A trailing user turn identical to `current_input` is dropped: the current
/// message is appended separately when the session is built.
pub fn history_from_turns(turns: &[ChatTurn], current_input: &str) -> Vec<Message> {
    let turns = match turns.split_last() {
        Some((last, rest)) if last.role == TurnRole::User && last.content == current_input => rest,
        _ => turns,
    };

    turns
        .iter()
        .map(|t| match t.role {
            TurnRole::User => Message::user(&t.content),
            TurnRole::Assistant => Message::assistant(&t.content),
        })
        .collect()
}
