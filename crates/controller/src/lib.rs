#![deny(unused)]
//! Operation dispatcher for the code agent.
//!
//! This crate turns editor-style requests (suggest, edit, test, install,
//! execute) into completion-provider prompts or sandbox calls.

pub mod agent;
pub mod analyzer;

pub use agent::CodeAgent;
pub use analyzer::{CodeAnalyzer, DEFAULT_CONTEXT_WINDOW};
