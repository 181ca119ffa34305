use crate::conversation::{Message, MessageRole};

/// Trim history to at most `limit` trailing messages without separating a
/// tool result from the assistant message that requested it. If the naive
/// slice would start on a `tool` message, the start index walks backward to
/// the nearest non-tool message; any leading tool messages that still lack a
/// tool-call carrier inside the window are dropped as defensive cleanup.
pub fn window(messages: &[Message], limit: usize) -> Vec<Message> {
    if limit == 0 || messages.is_empty() {
        return Vec::new();
    }

    let mut start = messages.len().saturating_sub(limit);
    while start > 0 && messages[start].role == MessageRole::Tool {
        start -= 1;
    }

    let mut windowed: Vec<Message> = messages[start..].to_vec();

    // A tool message at the head of the window has no preceding assistant
    // carrier by construction; such entries only appear in malformed or
    // pre-truncated histories and are dropped.
    while windowed.first().map(|message| message.role == MessageRole::Tool).unwrap_or(false) {
        windowed.remove(0);
    }

    windowed
}
