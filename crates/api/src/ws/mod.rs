//! WebSocket infrastructure for real-time notifications.
//!
//! Provides the connection hub, per-connection read/write pumps, and the
//! HTTP upgrade handler used by Axum routes.

mod handler;
pub mod hub;

pub use handler::ws_handler;
pub use hub::{ConnectionStats, HubHandle, NotificationHub, OUTBOX_CAPACITY};
