//! Shared domain types, errors, and constants for the darkroom workspace.
//!
//! This crate has no internal dependencies so every other workspace crate
//! can use it without cycles.

pub mod error;
pub mod naming;
pub mod notifications;
pub mod types;

pub use error::CoreError;
