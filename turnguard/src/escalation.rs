//! Escalation controller: decides, once per finished turn, whether to nudge.
//!
//! The controller runs a two-pass protocol. Pass 1 classifies a narrow
//! context window; only a `MORE-CONTEXT` verdict escalates to pass 2 over a
//! wide window. A `NEEDS-NUDGE` verdict enqueues one corrective follow-up,
//! at most [`MAX_NUDGES`] times per user-initiated turn sequence.
//!
//! Classification suspends the handler, and input events may be handled in
//! the meantime. Every decision made after a suspension re-reads state
//! through [`EscalationState::try_nudge`].

use std::fmt;

use tracing::{debug, info, instrument, warn};

use crate::classify::ClassifierClient;
use crate::core::context_window::{NARROW_WINDOW, WIDE_WINDOW, build_context_window};
use crate::core::extract::message_text;
use crate::core::state::{EscalationState, MAX_NUDGES, TurnTicket};
use crate::core::types::{Classification, Message, StopReason};
use crate::host::{FollowUpOptions, Host, NotifyLevel};
use crate::io::completion::Completion;
use crate::io::models::ModelResolver;

/// Corrective follow-up sent when a turn ended with deferred work.
pub const NUDGE_MESSAGE: &str = "You stopped before finishing. Continue and complete the \
remaining work from the original request now instead of describing it or offering to do it. \
Do not create pull requests.";

/// Result of handling an input event. Input is never blocked or altered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Continue,
}

/// Why a turn was not classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    NoAssistantMessage,
    Aborted,
    EmptyAssistantText,
    PendingMessages,
    NudgeLimitReached,
    EmptyContext,
}

impl SkipReason {
    pub fn describe(self) -> &'static str {
        match self {
            SkipReason::Disabled => "disabled",
            SkipReason::NoAssistantMessage => "no assistant message",
            SkipReason::Aborted => "turn aborted",
            SkipReason::EmptyAssistantText => "assistant produced no text",
            SkipReason::PendingMessages => "messages already pending",
            SkipReason::NudgeLimitReached => "nudge limit reached",
            SkipReason::EmptyContext => "empty context window",
        }
    }
}

/// What `on_turn_end` did with a finished turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Stopped before any classification call.
    Skipped(SkipReason),
    /// Classified; the verdict needs no action.
    Settled(Classification),
    /// The session moved on while the classifier was running: either a
    /// `NEEDS-NUDGE` verdict went stale or escalation to pass 2 was abandoned.
    Suppressed,
    /// A nudge was enqueued; `count` nudges sent in this turn sequence.
    Nudged { count: u32 },
}

impl TurnOutcome {
    pub fn is_nudge(self) -> bool {
        matches!(self, TurnOutcome::Nudged { .. })
    }
}

impl fmt::Display for TurnOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnOutcome::Skipped(reason) => write!(f, "skipped: {}", reason.describe()),
            TurnOutcome::Settled(classification) => write!(f, "{classification}"),
            TurnOutcome::Suppressed => write!(f, "suppressed: session changed during classification"),
            TurnOutcome::Nudged { count } => write!(f, "NEEDS-NUDGE (nudge {count}/{MAX_NUDGES})"),
        }
    }
}

pub struct EscalationController<C, R, H> {
    classifier: ClassifierClient<C, R>,
    host: H,
    state: EscalationState,
}

impl<C: Completion, R: ModelResolver, H: Host> EscalationController<C, R, H> {
    pub fn new(classifier: ClassifierClient<C, R>, host: H, enabled: bool) -> Self {
        Self {
            classifier,
            host,
            state: EscalationState::new(enabled),
        }
    }

    pub fn state(&self) -> &EscalationState {
        &self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.set_enabled(enabled);
    }

    /// Flip the user toggle, announce the new state, and return it.
    pub fn toggle(&self) -> bool {
        let enabled = self.state.toggle();
        let text = if enabled {
            "Turn check enabled"
        } else {
            "Turn check disabled"
        };
        self.host.notify(text, NotifyLevel::Info);
        enabled
    }

    pub fn nudge_count(&self) -> u32 {
        self.state.nudge_count()
    }

    /// A new user message arrived.
    pub fn on_input(&self) -> InputAction {
        self.state.reset();
        debug!("input observed, nudge count reset");
        InputAction::Continue
    }

    /// Classify a finished turn and nudge the agent if it deferred work.
    #[instrument(skip_all, fields(messages = messages.len()))]
    pub async fn on_turn_end(&self, messages: &[Message]) -> TurnOutcome {
        let ticket = self.state.ticket();
        if let Err(reason) = self.preflight(messages) {
            debug!(reason = reason.describe(), "turn check skipped");
            return TurnOutcome::Skipped(reason);
        }

        let context = build_context_window(messages, NARROW_WINDOW);
        if context.is_empty() {
            return TurnOutcome::Skipped(SkipReason::EmptyContext);
        }

        let mut verdict = self.run_pass(1, &context).await;
        if verdict == Classification::MoreContext {
            if !self.still_current(ticket) {
                warn!("session changed during pass 1, escalation abandoned");
                return TurnOutcome::Suppressed;
            }
            let wide = build_context_window(messages, WIDE_WINDOW);
            verdict = self.run_pass(2, &wide).await;
        }

        match verdict {
            Classification::NeedsNudge => self.commit_nudge(ticket),
            other => TurnOutcome::Settled(other),
        }
    }

    fn preflight(&self, messages: &[Message]) -> Result<(), SkipReason> {
        if !self.state.is_enabled() {
            return Err(SkipReason::Disabled);
        }
        let last = messages
            .iter()
            .rev()
            .find(|message| matches!(message, Message::Assistant { .. }))
            .ok_or(SkipReason::NoAssistantMessage)?;
        if let Message::Assistant {
            stop_reason: StopReason::Aborted,
            ..
        } = last
        {
            return Err(SkipReason::Aborted);
        }
        if message_text(last).is_empty() {
            return Err(SkipReason::EmptyAssistantText);
        }
        if self.host.has_pending_messages() {
            return Err(SkipReason::PendingMessages);
        }
        if self.state.limit_reached() {
            return Err(SkipReason::NudgeLimitReached);
        }
        Ok(())
    }

    async fn run_pass(&self, pass: u8, context: &str) -> Classification {
        let active = self.host.active_model();
        let verdict = self.classifier.classify(context, active.as_ref()).await;
        info!(pass, %verdict, "turn check pass complete");
        self.host.notify(
            &format!("Turn check (pass {pass}): {verdict}"),
            NotifyLevel::Info,
        );
        verdict
    }

    /// Whether the session is still the one the turn check started on.
    fn still_current(&self, ticket: TurnTicket) -> bool {
        self.state.is_enabled() && self.state.is_current(ticket) && self.host_settled()
    }

    fn host_settled(&self) -> bool {
        self.host.is_idle() && !self.host.has_pending_messages()
    }

    fn commit_nudge(&self, ticket: TurnTicket) -> TurnOutcome {
        let committed = self.state.try_nudge(ticket, || self.host_settled());
        let Some(count) = committed else {
            warn!("session changed during classification, nudge suppressed");
            return TurnOutcome::Suppressed;
        };

        self.host
            .enqueue_follow_up(NUDGE_MESSAGE, FollowUpOptions::NUDGE);
        info!(count, "nudge enqueued");
        self.host.notify(
            &format!("Turn check: nudging agent to continue ({count}/{MAX_NUDGES})"),
            NotifyLevel::Info,
        );
        TurnOutcome::Nudged { count }
    }
}
