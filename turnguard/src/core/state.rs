//! Escalation state shared between the input and turn-end handlers.
//!
//! Both handlers run on one cooperative execution context, but turn-end
//! handling suspends during classification and an input event may be
//! processed in between. State lives in atomics so either handler can touch
//! it through `&self`; nothing here is ever held across an `.await`.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Maximum nudges sent per user-initiated turn sequence.
pub const MAX_NUDGES: u32 = 2;

/// Snapshot of the input generation taken when turn-end handling begins.
///
/// A ticket goes stale as soon as a new input event is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnTicket {
    generation: u64,
}

/// Enabled flag, nudge counter, and input generation for one session.
#[derive(Debug)]
pub struct EscalationState {
    enabled: AtomicBool,
    nudge_count: AtomicU32,
    input_generation: AtomicU64,
}

impl Default for EscalationState {
    fn default() -> Self {
        Self::new(true)
    }
}

impl EscalationState {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            nudge_count: AtomicU32::new(0),
            input_generation: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Flip the enabled flag and return the new value.
    pub fn toggle(&self) -> bool {
        !self.enabled.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn nudge_count(&self) -> u32 {
        self.nudge_count.load(Ordering::SeqCst)
    }

    pub fn limit_reached(&self) -> bool {
        self.nudge_count() >= MAX_NUDGES
    }

    /// Record a new user input: zero the counter and invalidate outstanding tickets.
    pub fn reset(&self) {
        self.nudge_count.store(0, Ordering::SeqCst);
        self.input_generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn ticket(&self) -> TurnTicket {
        TurnTicket {
            generation: self.input_generation.load(Ordering::SeqCst),
        }
    }

    /// Whether no input event has been observed since `ticket` was taken.
    pub fn is_current(&self, ticket: TurnTicket) -> bool {
        self.input_generation.load(Ordering::SeqCst) == ticket.generation
    }

    /// Increment the counter unless it is already at [`MAX_NUDGES`].
    ///
    /// Returns the new count, or `None` when the cap was reached.
    pub fn record_nudge(&self) -> Option<u32> {
        self.nudge_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count < MAX_NUDGES).then_some(count + 1)
            })
            .ok()
            .map(|previous| previous + 1)
    }

    /// Commit a nudge if everything that justified it still holds.
    ///
    /// Re-validates the enabled flag, the ticket, and the caller's
    /// `preconditions` (host idleness, no pending messages) against current
    /// state, then records the nudge. The side effect must only be performed
    /// when this returns `Some`.
    pub fn try_nudge(
        &self,
        ticket: TurnTicket,
        preconditions: impl FnOnce() -> bool,
    ) -> Option<u32> {
        if !self.is_enabled() || !self.is_current(ticket) || !preconditions() {
            return None;
        }
        self.record_nudge()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_nudge_stops_at_cap() {
        let state = EscalationState::default();
        assert_eq!(state.record_nudge(), Some(1));
        assert_eq!(state.record_nudge(), Some(2));
        assert_eq!(state.record_nudge(), None);
        assert_eq!(state.nudge_count(), MAX_NUDGES);
        assert!(state.limit_reached());
    }

    #[test]
    fn reset_zeroes_count_and_invalidates_tickets() {
        let state = EscalationState::default();
        let ticket = state.ticket();
        state.record_nudge();
        state.record_nudge();

        state.reset();

        assert_eq!(state.nudge_count(), 0);
        assert!(!state.is_current(ticket));
        assert!(state.is_current(state.ticket()));
    }

    #[test]
    fn try_nudge_requires_current_ticket_and_preconditions() {
        let state = EscalationState::default();
        let ticket = state.ticket();

        assert_eq!(state.try_nudge(ticket, || false), None);
        assert_eq!(state.nudge_count(), 0);

        assert_eq!(state.try_nudge(ticket, || true), Some(1));

        state.reset();
        assert_eq!(state.try_nudge(ticket, || true), None);
        assert_eq!(state.nudge_count(), 0);
    }

    #[test]
    fn try_nudge_skips_preconditions_when_disabled() {
        let state = EscalationState::new(false);
        let ticket = state.ticket();
        let mut checked = false;
        assert_eq!(
            state.try_nudge(ticket, || {
                checked = true;
                true
            }),
            None
        );
        assert!(!checked);
    }

    #[test]
    fn toggle_returns_new_value() {
        let state = EscalationState::default();
        assert!(!state.toggle());
        assert!(!state.is_enabled());
        assert!(state.toggle());
        state.set_enabled(false);
        assert!(!state.is_enabled());
    }

    #[test]
    fn count_is_monotonic_and_bounded_without_input() {
        let state = EscalationState::default();
        let mut last = 0;
        for _ in 0..10 {
            state.record_nudge();
            let count = state.nudge_count();
            assert!(count >= last);
            assert!(count <= MAX_NUDGES);
            last = count;
        }
    }
}
