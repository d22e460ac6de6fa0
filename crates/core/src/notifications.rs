//! Notification type constants shared by the worker pipeline, the event
//! router, and the WebSocket hub.
//!
//! Every frame pushed to a client carries one of these strings in its
//! `type` field. Job lifecycle types are also the `event_type` of the
//! corresponding bus event.

/// Sent to a connection right after successful registration.
pub const MSG_TYPE_WELCOME: &str = "connection.established";

/// A job left the queue and entered processing.
pub const MSG_TYPE_IMAGE_PROCESSING: &str = "image.processing";

/// A job finished and its thumbnail is available.
pub const MSG_TYPE_IMAGE_COMPLETED: &str = "image.completed";

/// A job failed; the payload carries the error text.
pub const MSG_TYPE_IMAGE_FAILED: &str = "image.failed";

/// Operator announcement broadcast to every live connection.
pub const MSG_TYPE_SYSTEM_NOTICE: &str = "system.notice";

/// Prefix shared by all broadcast-to-everyone types.
pub const SYSTEM_EVENT_PREFIX: &str = "system.";
