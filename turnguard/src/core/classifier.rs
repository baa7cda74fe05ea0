//! Deterministic mapping from free-form model output to a verdict.

use crate::core::types::Classification;

/// Fixed instruction prompt for every classification pass.
pub const CLASSIFIER_SYSTEM_PROMPT: &str = include_str!("../prompts/classifier.md");

/// Labels checked in priority order. `DONE` is the fallback, never matched.
const LABEL_PRIORITY: [Classification; 3] = [
    Classification::NeedsNudge,
    Classification::MoreContext,
    Classification::ValidPause,
];

/// Classify model output text.
///
/// Matching is case-insensitive and by substring, in priority order
/// `NEEDS-NUDGE` > `MORE-CONTEXT` > `VALID-PAUSE`. Output naming none of them
/// (including empty output) is `DONE`.
pub fn parse_classification(output: &str) -> Classification {
    let normalized = output.to_uppercase();
    LABEL_PRIORITY
        .into_iter()
        .find(|label| normalized.contains(label.label()))
        .unwrap_or(Classification::Done)
}
