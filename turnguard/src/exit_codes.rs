//! Stable exit codes for turnguard CLI commands.

/// Command succeeded and no follow-up was enqueued.
pub const OK: i32 = 0;
/// Command failed due to invalid config, transcript, or other errors.
pub const INVALID: i32 = 1;
/// `turnguard check` enqueued a corrective follow-up.
pub const NUDGE: i32 = 2;
