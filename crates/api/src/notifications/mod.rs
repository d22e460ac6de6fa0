//! Notification routing infrastructure.
//!
//! The [`NotificationRouter`] subscribes to the event bus and forwards each
//! event to the WebSocket hub: owned events to the owner's connections,
//! system events to everyone.

pub mod router;

pub use router::NotificationRouter;
