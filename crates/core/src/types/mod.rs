//! Core type definitions for the code agent.

pub mod operation;

pub use operation::*;
