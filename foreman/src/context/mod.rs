//! Hierarchical context compression.
//!
//! When a node's state-side context exceeds its effective token limit, it is
//! compressed in stages: truncate older tool outputs, then truncate the oldest
//! non-system messages, then drop the oldest droppable units entirely. An
//! assistant message carrying tool calls and its Tool replies form one unit so
//! dropping never orphans a tool result. Never dropped: system prompts and the
//! current user turn. If the context still does not fit, the caller gets
//! `ContextTooLarge` and the driver routes per the error policy.

use crate::error::AgentError;
use crate::message::{Message, MessageRole};
use crate::state::Observation;
use crate::tokens::TokenCounter;

const TOOL_TRUNCATE_CHARS: usize = 240;
const MESSAGE_TRUNCATE_CHARS: usize = 400;
const ELIDED_MARKER: &str = " …[elided]";

fn truncate_content(content: &str, keep: usize) -> String {
    if content.len() <= keep {
        return content.to_string();
    }
    let mut cut = keep;
    while cut > 0 && !content.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &content[..cut], ELIDED_MARKER)
}

fn protected(messages: &[Message], index: usize) -> bool {
    let m = &messages[index];
    if m.role == MessageRole::System {
        return true;
    }
    if m.role == MessageRole::User {
        // The current user turn is the last user message.
        let last_user = messages
            .iter()
            .rposition(|x| x.role == MessageRole::User);
        return last_user == Some(index);
    }
    false
}

/// Compresses `messages` until their estimated size fits `limit`.
///
/// Returns the (possibly rewritten) message list, or `ContextTooLarge` when
/// even the protected minimum does not fit.
pub fn fit_within(
    mut messages: Vec<Message>,
    limit: u32,
    counter: &TokenCounter,
) -> Result<Vec<Message>, AgentError> {
    if counter.count_messages(&messages) <= limit {
        return Ok(messages);
    }

    // Stage 1: truncate older tool outputs (keep the most recent one intact).
    let last_tool = messages.iter().rposition(|m| m.role == MessageRole::Tool);
    for (i, m) in messages.iter_mut().enumerate() {
        if m.role == MessageRole::Tool && Some(i) != last_tool {
            m.content = truncate_content(&m.content, TOOL_TRUNCATE_CHARS);
        }
    }
    if counter.count_messages(&messages) <= limit {
        return Ok(messages);
    }

    // Stage 2: truncate the oldest non-system, non-protected messages.
    for i in 0..messages.len() {
        if protected(&messages, i) {
            continue;
        }
        messages[i].content = truncate_content(&messages[i].content, MESSAGE_TRUNCATE_CHARS);
        if counter.count_messages(&messages) <= limit {
            return Ok(messages);
        }
    }

    // Stage 3: drop the oldest droppable units (assistant + its tool replies).
    loop {
        let Some(start) = (0..messages.len()).find(|&i| !protected(&messages, i)) else {
            break;
        };
        let unit_ids: Vec<String> = messages[start]
            .tool_calls
            .iter()
            .map(|c| c.id.clone())
            .collect();
        messages.remove(start);
        if !unit_ids.is_empty() {
            messages.retain(|m| {
                m.tool_call_id
                    .as_ref()
                    .map_or(true, |id| !unit_ids.contains(id))
            });
        }
        if counter.count_messages(&messages) <= limit {
            return Ok(messages);
        }
    }

    Err(AgentError::ContextTooLarge(format!(
        "context of {} tokens exceeds limit {} after compression",
        counter.count_messages(&messages),
        limit
    )))
}

/// Joins observations newest-first into a digest that fits `limit` tokens;
/// the oldest observations fall off first.
pub fn observation_digest(
    observations: &[Observation],
    limit: u32,
    counter: &TokenCounter,
) -> String {
    let mut kept: Vec<&Observation> = Vec::new();
    let mut used = 0u32;
    for obs in observations.iter().rev() {
        let cost = counter.count(&obs.content) + 8;
        if used + cost > limit && !kept.is_empty() {
            break;
        }
        used += cost;
        kept.push(obs);
    }
    kept.reverse();
    kept.iter()
        .map(|o| format!("[{}] {}", o.agent, o.content))
        .collect::<Vec<_>>()
        .join("\n")
}
