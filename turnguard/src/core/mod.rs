//! Deterministic, pure logic for turn classification.
//!
//! Core modules are free of I/O. They operate on in-memory transcripts and
//! return deterministic outputs suitable for tests.

pub mod classifier;
pub mod context_window;
pub mod extract;
pub mod state;
pub mod types;
