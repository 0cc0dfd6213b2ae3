#![deny(unused)]
//! Core types, traits, and error definitions for the code agent.
//!
//! This crate provides the building blocks shared by the sandbox engine
//! and the operation dispatcher: the error type, configuration, logging
//! setup, the completion-provider capability and the dispatcher contract.

pub mod config;
pub mod error;
pub mod mocks;
pub mod telemetry;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
