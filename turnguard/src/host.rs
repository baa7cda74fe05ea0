//! Host capabilities consumed by the escalation controller.
//!
//! The [`Host`] trait decouples the controller from the agent runtime it runs
//! inside. The CLI uses [`StaticHost`], an in-memory host over a transcript
//! that is always idle; tests use recording hosts whose idleness and pending
//! state can change while a classification is in flight.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use crate::core::types::Model;

/// Severity attached to an observability notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Warning,
    Error,
}

/// Delivery flags for an enqueued follow-up message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpOptions {
    /// Start a new agent turn once the message is delivered.
    pub trigger_new_turn: bool,
    /// Show the message in the transcript.
    pub visible: bool,
}

impl FollowUpOptions {
    /// Options used for corrective nudges.
    pub const NUDGE: Self = Self {
        trigger_new_turn: true,
        visible: true,
    };
}

/// A follow-up message recorded by an in-memory host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUp {
    pub content: String,
    pub options: FollowUpOptions,
}

/// Session introspection and emission provided by the agent runtime.
pub trait Host: Send + Sync {
    /// Whether the agent is currently idle (no turn in progress).
    fn is_idle(&self) -> bool;

    /// Whether follow-up messages are already queued for delivery.
    fn has_pending_messages(&self) -> bool;

    /// Model driving the current conversation, if any.
    fn active_model(&self) -> Option<Model>;

    /// Queue a user-role message for delivery after the current turn.
    fn enqueue_follow_up(&self, content: &str, options: FollowUpOptions);

    /// Fire-and-forget notification. Must never affect control flow.
    fn notify(&self, text: &str, level: NotifyLevel);
}

impl<T: Host + ?Sized> Host for Arc<T> {
    fn is_idle(&self) -> bool {
        (**self).is_idle()
    }

    fn has_pending_messages(&self) -> bool {
        (**self).has_pending_messages()
    }

    fn active_model(&self) -> Option<Model> {
        (**self).active_model()
    }

    fn enqueue_follow_up(&self, content: &str, options: FollowUpOptions) {
        (**self).enqueue_follow_up(content, options);
    }

    fn notify(&self, text: &str, level: NotifyLevel) {
        (**self).notify(text, level);
    }
}

/// In-memory host over a finished transcript.
///
/// Always idle with nothing pending. Follow-ups are recorded instead of
/// delivered; notifications go to tracing and stderr.
#[derive(Debug, Default)]
pub struct StaticHost {
    active_model: Option<Model>,
    follow_ups: Mutex<Vec<FollowUp>>,
}

impl StaticHost {
    pub fn new(active_model: Option<Model>) -> Self {
        Self {
            active_model,
            follow_ups: Mutex::new(Vec::new()),
        }
    }

    /// Follow-ups enqueued so far, oldest first.
    pub fn follow_ups(&self) -> Vec<FollowUp> {
        self.follow_ups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Host for StaticHost {
    fn is_idle(&self) -> bool {
        true
    }

    fn has_pending_messages(&self) -> bool {
        !self
            .follow_ups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    fn active_model(&self) -> Option<Model> {
        self.active_model.clone()
    }

    fn enqueue_follow_up(&self, content: &str, options: FollowUpOptions) {
        info!(visible = options.visible, "follow-up enqueued");
        self.follow_ups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FollowUp {
                content: content.to_string(),
                options,
            });
    }

    fn notify(&self, text: &str, level: NotifyLevel) {
        match level {
            NotifyLevel::Info => info!(%text, "notify"),
            NotifyLevel::Warning | NotifyLevel::Error => warn!(%text, ?level, "notify"),
        }
        eprintln!("{text}");
    }
}
