//! Shared transcript and verdict types for the classification core.
//!
//! These types mirror the host's transcript records. They are read-only from
//! the core's point of view and must deserialize any record the host may emit
//! without failing on unknown roles, part types, or stop reasons.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// A single transcript entry, tagged by `role`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Message {
    User {
        #[serde(default)]
        content: MessageContent,
    },
    Assistant {
        #[serde(default)]
        content: MessageContent,
        #[serde(default)]
        stop_reason: StopReason,
    },
    ToolResult {
        #[serde(default)]
        content: MessageContent,
        #[serde(default)]
        tool_name: String,
        #[serde(default)]
        is_error: bool,
    },
    /// Any role the core does not interpret (system notes, custom entries).
    #[serde(other)]
    Other,
}

impl Message {
    /// Build a user message with plain-string content.
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }
}

/// Message body: a plain string or an ordered list of typed parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
    /// Any other JSON shape. Carries no text.
    Other(serde_json::Value),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Parts(Vec::new())
    }
}

/// A typed content part. Only `text` parts carry meaning for classification.
///
/// Deserialization never fails: a malformed part becomes [`ContentPart::Other`]
/// so it cannot take the valid parts of the same message down with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentPart {
    Text { text: String },
    /// Tool calls, images, thinking blocks, and other non-text parts.
    Other,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    fn from_value(value: &serde_json::Value) -> Self {
        match value.get("type").and_then(serde_json::Value::as_str) {
            Some("text") => Self::text(
                value
                    .get("text")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default(),
            ),
            _ => Self::Other,
        }
    }
}

impl<'de> Deserialize<'de> for ContentPart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

/// Why a generation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    #[default]
    #[serde(alias = "stop")]
    Normal,
    Aborted,
    Error,
    /// `length`, `toolUse`, and anything else the provider reports.
    #[serde(other)]
    Other,
}

impl StopReason {
    /// Whether the generation failed or was cancelled before completing.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Aborted | Self::Error)
    }
}

/// Verdict for one classification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// The request is genuinely finished (including recaps of completed work).
    Done,
    /// The agent is blocked on input or approval only the user can give.
    ValidPause,
    /// The excerpt is not enough to decide.
    MoreContext,
    /// Work was deferred, offered conditionally, or left as suggestions.
    NeedsNudge,
}

impl Classification {
    /// Label as it appears in model output and notifications.
    pub fn label(self) -> &'static str {
        match self {
            Self::Done => "DONE",
            Self::ValidPause => "VALID-PAUSE",
            Self::MoreContext => "MORE-CONTEXT",
            Self::NeedsNudge => "NEEDS-NUDGE",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A provider/model pair as known to the host's model registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub provider: String,
    pub id: String,
}

impl Model {
    pub fn new(provider: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_host_transcript_records() {
        let raw = r#"[
            {"role": "user", "content": "Fix the bug"},
            {"role": "assistant", "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Looking now."},
                {"type": "toolCall", "id": "c1", "name": "bash"}
            ], "stopReason": "toolUse"},
            {"role": "toolResult", "toolName": "bash", "isError": true,
             "content": [{"type": "text", "text": "exit 1"}]},
            {"role": "bashExecution", "command": "ls"}
        ]"#;
        let messages: Vec<Message> = serde_json::from_str(raw).expect("parse");

        assert_eq!(messages[0], Message::user("Fix the bug"));
        match &messages[1] {
            Message::Assistant {
                content: MessageContent::Parts(parts),
                stop_reason,
            } => {
                assert_eq!(*stop_reason, StopReason::Other);
                assert_eq!(
                    parts,
                    &vec![
                        ContentPart::Other,
                        ContentPart::text("Looking now."),
                        ContentPart::Other
                    ]
                );
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert!(matches!(
            &messages[2],
            Message::ToolResult { tool_name, is_error: true, .. } if tool_name == "bash"
        ));
        assert_eq!(messages[3], Message::Other);
    }

    #[test]
    fn malformed_parts_keep_sibling_text() {
        let untyped: Message = serde_json::from_str(
            r#"{"role": "assistant", "content": [
                {"type": "text", "text": "I'll do it later."},
                {"data": "x"},
                "stray"
            ]}"#,
        )
        .expect("parse");
        let null_text: Message = serde_json::from_str(
            r#"{"role": "assistant", "content": [
                {"type": "text", "text": "I'll do it later."},
                {"type": "text", "text": null},
                {"type": "text"}
            ]}"#,
        )
        .expect("parse");

        assert!(matches!(
            &untyped,
            Message::Assistant { content: MessageContent::Parts(parts), .. }
                if parts == &vec![ContentPart::text("I'll do it later."), ContentPart::Other, ContentPart::Other]
        ));
        assert!(matches!(
            &null_text,
            Message::Assistant { content: MessageContent::Parts(parts), .. }
                if parts == &vec![ContentPart::text("I'll do it later."), ContentPart::text(""), ContentPart::text("")]
        ));
        assert_eq!(crate::core::extract::message_text(&untyped), "I'll do it later.");
        assert_eq!(crate::core::extract::message_text(&null_text), "I'll do it later.");
    }

    #[test]
    fn stop_reason_defaults_to_normal_and_accepts_stop_alias() {
        let missing: Message =
            serde_json::from_str(r#"{"role": "assistant", "content": "hi"}"#).expect("parse");
        let alias: Message = serde_json::from_str(
            r#"{"role": "assistant", "content": "hi", "stopReason": "stop"}"#,
        )
        .expect("parse");
        for message in [missing, alias] {
            assert!(matches!(
                message,
                Message::Assistant {
                    stop_reason: StopReason::Normal,
                    ..
                }
            ));
        }
    }

    #[test]
    fn classification_labels_use_hyphenated_form() {
        assert_eq!(Classification::Done.to_string(), "DONE");
        assert_eq!(Classification::ValidPause.to_string(), "VALID-PAUSE");
        assert_eq!(Classification::MoreContext.to_string(), "MORE-CONTEXT");
        assert_eq!(Classification::NeedsNudge.to_string(), "NEEDS-NUDGE");
    }
}
