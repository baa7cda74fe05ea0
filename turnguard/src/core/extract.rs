//! Flatten transcript records into plain text.

use crate::core::types::{ContentPart, Message, MessageContent};

/// Return the trimmed text carried by `message`, or an empty string.
///
/// Absence of text (tool-call-only turns, unknown roles) is a normal case,
/// never an error.
pub fn message_text(message: &Message) -> String {
    match message {
        Message::User { content }
        | Message::Assistant { content, .. }
        | Message::ToolResult { content, .. } => content_text(content),
        Message::Other => String::new(),
    }
}

/// Return the trimmed text of a content body. Only `text` parts contribute.
pub fn content_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.trim().to_string(),
        MessageContent::Parts(parts) => parts_text(parts),
        MessageContent::Other(_) => String::new(),
    }
}

/// Join the `text` parts of `parts` with newlines and trim the result.
pub fn parts_text(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            ContentPart::Other => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StopReason;

    #[test]
    fn plain_string_is_trimmed() {
        assert_eq!(message_text(&Message::user("  hello \n")), "hello");
    }

    #[test]
    fn text_parts_are_joined_in_order() {
        let message = Message::Assistant {
            content: MessageContent::Parts(vec![
                ContentPart::text(" first"),
                ContentPart::Other,
                ContentPart::text("second "),
            ]),
            stop_reason: StopReason::Normal,
        };
        assert_eq!(message_text(&message), "first\nsecond");
    }

    #[test]
    fn tool_call_only_turn_has_no_text() {
        let message = Message::Assistant {
            content: MessageContent::Parts(vec![ContentPart::Other]),
            stop_reason: StopReason::Normal,
        };
        assert_eq!(message_text(&message), "");
    }

    #[test]
    fn unknown_shapes_yield_empty_text() {
        assert_eq!(message_text(&Message::Other), "");
        let message = Message::User {
            content: MessageContent::Other(serde_json::json!({"blob": 1})),
        };
        assert_eq!(message_text(&message), "");
    }

    #[test]
    fn tool_results_expose_their_text() {
        let message = Message::ToolResult {
            content: MessageContent::Parts(vec![ContentPart::text("ok\n")]),
            tool_name: "bash".to_string(),
            is_error: false,
        };
        assert_eq!(message_text(&message), "ok");
    }
}
