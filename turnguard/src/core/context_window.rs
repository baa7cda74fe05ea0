//! Bounded context windows for classification passes.
//!
//! A window has up to three sections, separated by a blank line:
//!
//! 1. `[ORIGINAL USER REQUEST]: ...` (first user message with text)
//! 2. the most recent user/assistant exchanges, oldest first
//! 3. `[TOOLS EXECUTED IN THIS TURN]:` digest for the latest turn
//!
//! When the original request already falls inside the recent exchanges it is
//! labeled in place rather than repeated as a separate section.

use tracing::debug;

use crate::core::extract::message_text;
use crate::core::types::Message;

/// Recent exchanges included in the first (cheap) pass.
pub const NARROW_WINDOW: usize = 4;
/// Recent exchanges included in the escalated second pass.
pub const WIDE_WINDOW: usize = 10;

const ORIGINAL_LABEL: &str = "[ORIGINAL USER REQUEST]";
const USER_LABEL: &str = "[USER]";
const ASSISTANT_LABEL: &str = "[ASSISTANT]";
const TOOLS_HEADER: &str = "[TOOLS EXECUTED IN THIS TURN]:";

/// Build the context window for one pass over `messages`.
///
/// Returns an empty string when there is nothing to classify; callers must
/// skip the pass in that case.
pub fn build_context_window(messages: &[Message], recent_count: usize) -> String {
    let original = original_request(messages);
    let recent = recent_exchanges(messages, recent_count, original.as_deref());
    let tools = tool_activity(messages);

    let mut sections = Vec::with_capacity(3);
    if let Some(original) = original.as_deref()
        && !recent.includes_original
    {
        sections.push(format!("{ORIGINAL_LABEL}: {original}"));
    }
    if !recent.lines.is_empty() {
        sections.push(recent.lines.join("\n"));
    }
    if !tools.is_empty() {
        sections.push(format!("{TOOLS_HEADER}\n{}", tools.join("\n")));
    }

    debug!(
        recent_count,
        recent_lines = recent.lines.len(),
        tool_lines = tools.len(),
        has_original = original.is_some(),
        "built context window"
    );
    sections.join("\n\n")
}

/// Text of the first user message that carries any text.
pub fn original_request(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .filter(|message| message.is_user())
        .map(message_text)
        .find(|text| !text.is_empty())
}

struct RecentExchanges {
    lines: Vec<String>,
    includes_original: bool,
}

fn recent_exchanges(
    messages: &[Message],
    recent_count: usize,
    original: Option<&str>,
) -> RecentExchanges {
    let mut entries: Vec<(&'static str, String)> = Vec::new();
    for message in messages.iter().rev() {
        if entries.len() >= recent_count {
            break;
        }
        let label = match message {
            Message::User { .. } => USER_LABEL,
            Message::Assistant { .. } => ASSISTANT_LABEL,
            Message::ToolResult { .. } | Message::Other => continue,
        };
        let text = message_text(message);
        if !text.is_empty() {
            entries.push((label, text));
        }
    }
    entries.reverse();

    let original_at = original.and_then(|original| {
        entries
            .iter()
            .position(|(label, text)| *label == USER_LABEL && text == original)
    });
    if let Some(index) = original_at {
        entries[index].0 = ORIGINAL_LABEL;
    }

    RecentExchanges {
        lines: entries
            .into_iter()
            .map(|(label, text)| format!("{label}: {text}"))
            .collect(),
        includes_original: original_at.is_some(),
    }
}

/// Tool results recorded since the most recent user message, oldest first.
fn tool_activity(messages: &[Message]) -> Vec<String> {
    let mut lines = Vec::new();
    for message in messages.iter().rev() {
        match message {
            Message::User { .. } => break,
            Message::ToolResult {
                tool_name,
                is_error,
                ..
            } if !tool_name.is_empty() => {
                let status = if *is_error { "failed" } else { "ok" };
                lines.push(format!("  - {tool_name} ({status})"));
            }
            _ => {}
        }
    }
    lines.reverse();
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ContentPart, MessageContent, StopReason};

    fn assistant(text: &str) -> Message {
        Message::Assistant {
            content: MessageContent::Parts(vec![ContentPart::text(text)]),
            stop_reason: StopReason::Normal,
        }
    }

    fn tool(name: &str, is_error: bool) -> Message {
        Message::ToolResult {
            content: MessageContent::Text("output".to_string()),
            tool_name: name.to_string(),
            is_error,
        }
    }

    #[test]
    fn empty_history_builds_empty_window() {
        assert_eq!(build_context_window(&[], NARROW_WINDOW), "");
        assert_eq!(
            build_context_window(&[Message::Other, assistant("  ")], NARROW_WINDOW),
            ""
        );
    }

    #[test]
    fn original_request_inside_window_is_labeled_once() {
        let messages = vec![
            Message::user("Refactor auth module"),
            assistant("Done! Refactored and tests pass."),
        ];
        let window = build_context_window(&messages, NARROW_WINDOW);
        assert_eq!(
            window,
            "[ORIGINAL USER REQUEST]: Refactor auth module\n\
             [ASSISTANT]: Done! Refactored and tests pass."
        );
        assert_eq!(window.matches("Refactor auth module").count(), 1);
    }

    #[test]
    fn original_request_outside_window_gets_its_own_section() {
        let messages = vec![
            Message::user("Build the parser"),
            assistant("Started."),
            Message::user("keep going"),
            assistant("Lexer done."),
            Message::user("and the AST?"),
            assistant("AST next."),
        ];
        let window = build_context_window(&messages, 3);
        assert_eq!(
            window,
            "[ORIGINAL USER REQUEST]: Build the parser\n\n\
             [ASSISTANT]: Lexer done.\n\
             [USER]: and the AST?\n\
             [ASSISTANT]: AST next."
        );
    }

    #[test]
    fn recent_window_skips_empty_and_non_conversational_messages() {
        let messages = vec![
            Message::user("   "),
            Message::user("Real request"),
            assistant(""),
            tool("bash", false),
            Message::Other,
            assistant("Answer"),
        ];
        let window = build_context_window(&messages, 1);
        assert_eq!(
            window,
            "[ORIGINAL USER REQUEST]: Real request\n\n\
             [ASSISTANT]: Answer\n\n\
             [TOOLS EXECUTED IN THIS TURN]:\n  - bash (ok)"
        );
    }

    #[test]
    fn tool_digest_covers_only_the_latest_turn() {
        let messages = vec![
            Message::user("first"),
            tool("read", false),
            assistant("read it"),
            Message::user("second"),
            tool("edit", false),
            tool("", true),
            tool("bash", true),
            assistant("edited"),
        ];
        let window = build_context_window(&messages, NARROW_WINDOW);
        assert!(window.ends_with(
            "[TOOLS EXECUTED IN THIS TURN]:\n  - edit (ok)\n  - bash (failed)"
        ));
        assert!(!window.contains("read (ok)"));
    }

    #[test]
    fn wide_window_includes_more_history() {
        let mut messages = Vec::new();
        for i in 0..8 {
            messages.push(Message::user(format!("question {i}")));
            messages.push(assistant(&format!("answer {i}")));
        }
        let narrow = build_context_window(&messages, NARROW_WINDOW);
        let wide = build_context_window(&messages, WIDE_WINDOW);
        assert_eq!(narrow.matches("[USER]").count(), 2);
        assert_eq!(wide.matches("[USER]").count(), 5);
        assert!(narrow.starts_with("[ORIGINAL USER REQUEST]: question 0\n\n"));
    }

    #[test]
    fn repeated_original_text_is_labeled_at_most_once() {
        let messages = vec![
            Message::user("retry"),
            assistant("failed"),
            Message::user("retry"),
            assistant("ok"),
        ];
        let window = build_context_window(&messages, NARROW_WINDOW);
        assert_eq!(window.matches(ORIGINAL_LABEL).count(), 1);
        assert_eq!(window.matches(USER_LABEL).count(), 1);
    }
}
