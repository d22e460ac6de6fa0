//! Darkroom event bus.
//!
//! Building blocks for the in-process event system:
//!
//! - [`EventBus`] -- publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PipelineEvent`] -- the canonical event envelope emitted by the
//!   processing pipeline.

pub mod bus;

pub use bus::{EventBus, PipelineEvent};
