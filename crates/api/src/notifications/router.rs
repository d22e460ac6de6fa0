//! Event-to-notification routing.
//!
//! [`NotificationRouter`] subscribes to the pipeline event bus and turns
//! each event into a WebSocket frame for the hub to deliver.

use axum::extract::ws::Message;
use tokio::sync::broadcast;

use darkroom_core::notifications::SYSTEM_EVENT_PREFIX;
use darkroom_events::PipelineEvent;

use crate::ws::HubHandle;

/// Routes pipeline events to WebSocket connections.
pub struct NotificationRouter {
    hub: HubHandle,
}

impl NotificationRouter {
    /// Create a new router delivering through the given hub.
    pub fn new(hub: HubHandle) -> Self {
        Self { hub }
    }

    /// Run the main routing loop.
    ///
    /// Subscribes to the event bus via `receiver` and processes each event.
    /// The loop exits when the channel is closed (i.e. the
    /// [`EventBus`](darkroom_events::EventBus) is dropped).
    pub async fn run(self, mut receiver: broadcast::Receiver<PipelineEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.route_event(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification router lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notification router shutting down");
                    break;
                }
            }
        }
    }

    /// Deliver a single event.
    ///
    /// Owned events go to the owner's connections only. Ownerless events
    /// are broadcast when their type says so, and dropped otherwise.
    async fn route_event(&self, event: &PipelineEvent) {
        let message = notification_frame(event);

        if let Some(owner_id) = event.owner_id {
            self.hub.notify_owner(owner_id, message).await;
        } else if event.event_type.starts_with(SYSTEM_EVENT_PREFIX) {
            self.hub.broadcast(message).await;
        } else {
            tracing::debug!(
                event_type = %event.event_type,
                "Event has neither an owner nor broadcast scope, dropping"
            );
        }
    }
}

/// Serialize an event into the wire frame pushed to clients.
///
/// `owner_id` is null on broadcast frames.
fn notification_frame(event: &PipelineEvent) -> Message {
    let frame = serde_json::json!({
        "type": event.event_type,
        "owner_id": event.owner_id,
        "payload": event.payload,
        "timestamp": event.timestamp,
    });
    Message::Text(frame.to_string().into())
}
