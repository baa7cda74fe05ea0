//! Turn-completion classification and escalation for autonomous agents.
//!
//! When an agent turn ends, [`escalation::EscalationController`] decides
//! whether the agent genuinely finished, is legitimately waiting on the user,
//! or silently deferred work. Deferred work earns one bounded corrective
//! follow-up. The crate is split the usual way:
//!
//! - **[`core`]**: Pure logic (text extraction, context windows, label
//!   mapping, escalation state). No I/O.
//! - **[`io`]**: Side-effecting adapters (config, transcripts, the
//!   process-backed completion backend, model resolution).
//!
//! [`classify`] and [`escalation`] compose the two behind the [`host::Host`]
//! and [`io::completion::Completion`] seams.

pub mod classify;
pub mod core;
pub mod escalation;
pub mod exit_codes;
pub mod host;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
