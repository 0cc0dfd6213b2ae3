//! Core traits for the code agent.
//!
//! - `llm`: the completion provider capability consumed by the dispatcher

pub mod llm;

pub use llm::*;
