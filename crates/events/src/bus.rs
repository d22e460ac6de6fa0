//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for [`PipelineEvent`]s.
//! It is designed to be shared via `Arc<EventBus>` across the application.

use chrono::{DateTime, Utc};
use darkroom_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// An event emitted by the image-processing pipeline.
///
/// Constructed via [`PipelineEvent::new`] and enriched with the builder
/// methods [`with_image`](PipelineEvent::with_image),
/// [`with_owner`](PipelineEvent::with_owner), and
/// [`with_payload`](PipelineEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Dot-separated event name, e.g. `"image.completed"`.
    pub event_type: String,

    /// Optional database id of the image the event concerns.
    pub image_id: Option<DbId>,

    /// Optional id of the user that owns the image.
    ///
    /// Events with an owner are routed to that user's connections; events
    /// without one can only be broadcast.
    pub owner_id: Option<DbId>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl PipelineEvent {
    /// Create a new event with only the required `event_type`.
    ///
    /// All optional fields default to `None` / empty object.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            image_id: None,
            owner_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Attach the subject image to the event.
    pub fn with_image(mut self, image_id: DbId) -> Self {
        self.image_id = Some(image_id);
        self
    }

    /// Attach the owning user to the event.
    pub fn with_owner(mut self, owner_id: DbId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`PipelineEvent`].
///
/// # Usage
///
/// ```rust
/// use darkroom_events::bus::{EventBus, PipelineEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(PipelineEvent::new("image.completed"));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: PipelineEvent) {
        // Ignore the SendError -- it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let event = PipelineEvent::new("image.completed")
            .with_image(42)
            .with_owner(7)
            .with_payload(serde_json::json!({"thumbnail_url": "/static/thumbnails/42.jpg"}));

        bus.publish(event);

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, "image.completed");
        assert_eq!(received.image_id, Some(42));
        assert_eq!(received.owner_id, Some(7));
        assert_eq!(received.payload["thumbnail_url"], "/static/thumbnails/42.jpg");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(PipelineEvent::new("image.processing"));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");

        assert_eq!(e1.event_type, "image.processing");
        assert_eq!(e2.event_type, "image.processing");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        // No subscribers; this must not panic.
        bus.publish(PipelineEvent::new("system.notice"));
    }

    #[test]
    fn default_event_has_empty_optional_fields() {
        let event = PipelineEvent::new("image.failed");
        assert_eq!(event.event_type, "image.failed");
        assert!(event.image_id.is_none());
        assert!(event.owner_id.is_none());
        assert!(event.payload.is_object());
    }
}
