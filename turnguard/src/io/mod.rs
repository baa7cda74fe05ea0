//! I/O adapters: configuration, transcripts, model backends.

pub mod completion;
pub mod config;
pub mod models;
pub mod process;
pub mod transcript;
