//! Transcript files for offline classification.
//!
//! Two layouts are accepted: a JSON array of messages, or JSON Lines with one
//! message per line (blank lines ignored).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::Message;

/// Load a transcript from disk.
pub fn load_transcript(path: &Path) -> Result<Vec<Message>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read transcript {}", path.display()))?;
    let messages =
        parse_transcript(&contents).with_context(|| format!("parse {}", path.display()))?;
    debug!(path = %path.display(), messages = messages.len(), "transcript loaded");
    Ok(messages)
}

/// Parse transcript text in either supported layout.
pub fn parse_transcript(contents: &str) -> Result<Vec<Message>> {
    if contents.trim_start().starts_with('[') {
        return serde_json::from_str(contents).context("parse transcript json array");
    }
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).with_context(|| format!("parse transcript line {}", index + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StopReason;

    #[test]
    fn parses_json_array() {
        let messages = parse_transcript(
            r#"[{"role":"user","content":"hi"},{"role":"assistant","content":"hello"}]"#,
        )
        .expect("parse");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], Message::user("hi"));
    }

    #[test]
    fn parses_json_lines_skipping_blank_lines() {
        let raw = "{\"role\":\"user\",\"content\":\"hi\"}\n\n{\"role\":\"assistant\",\"content\":\"bye\",\"stopReason\":\"aborted\"}\n";
        let messages = parse_transcript(raw).expect("parse");
        assert_eq!(messages.len(), 2);
        assert!(matches!(
            messages[1],
            Message::Assistant {
                stop_reason: StopReason::Aborted,
                ..
            }
        ));
    }

    #[test]
    fn reports_line_number_of_bad_record() {
        let raw = "{\"role\":\"user\",\"content\":\"hi\"}\nnot json\n";
        let err = parse_transcript(raw).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn load_reports_missing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_transcript(&temp.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("read transcript"));
    }
}
