//! Per-user push notification hub.
//!
//! All connection state lives inside a single task that owns the maps and
//! processes [`HubCommand`]s one at a time, so registration, delivery, and
//! eviction never race each other. Everything else in the process holds a
//! [`HubHandle`] and talks to the hub over its command channel.
//!
//! Delivery never blocks the hub: each connection has a bounded outbox
//! drained by its own socket task, and a connection whose outbox is full is
//! evicted on the spot rather than slowing the pipeline down. A mirror of
//! the connection counts is kept behind an `RwLock` so the stats endpoint
//! reads a snapshot instead of queueing behind deliveries.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use darkroom_core::notifications::MSG_TYPE_WELCOME;
use darkroom_core::types::{DbId, Timestamp};

/// Outbound message buffer per connection.
///
/// Sized for bursts (a batch of jobs finishing at once), not sustained
/// throughput: a client that stays this far behind is evicted.
pub const OUTBOX_CAPACITY: usize = 64;

/// Command channel buffer between handles and the hub task.
const COMMAND_CAPACITY: usize = 256;

/// State for a single WebSocket connection.
struct Connection {
    /// Authenticated user id, `None` for anonymous connections.
    owner_id: Option<DbId>,
    /// Bounded channel to the connection's write pump.
    outbox: mpsc::Sender<Message>,
    /// When this connection was registered.
    connected_at: Timestamp,
}

/// Mutations and deliveries processed by the hub task.
enum HubCommand {
    Register {
        conn_id: Uuid,
        owner_id: Option<DbId>,
        outbox: mpsc::Sender<Message>,
    },
    Unregister {
        conn_id: Uuid,
    },
    NotifyOwner {
        owner_id: DbId,
        message: Message,
    },
    Broadcast {
        message: Message,
    },
    Shutdown,
}

/// Point-in-time connection counts, served by `GET /api/v1/stats/connections`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ConnectionStats {
    /// Number of live connections, anonymous ones included.
    pub total_connections: usize,
    /// Number of users with at least one live connection.
    pub distinct_owners: usize,
}

/// Cloneable handle for talking to the hub task.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
    stats: Arc<RwLock<ConnectionStats>>,
}

impl HubHandle {
    /// Register a connection and return the receiver half of its outbox.
    ///
    /// The first message delivered through the receiver is always the
    /// welcome frame.
    pub async fn register(&self, conn_id: Uuid, owner_id: Option<DbId>) -> mpsc::Receiver<Message> {
        let (outbox, rx) = mpsc::channel(OUTBOX_CAPACITY);
        let command = HubCommand::Register {
            conn_id,
            owner_id,
            outbox,
        };
        if self.commands.send(command).await.is_err() {
            // Hub already stopped; the dropped sender makes the socket
            // task close immediately.
            tracing::warn!(%conn_id, "Hub is gone, rejecting connection");
        }
        rx
    }

    /// Remove a connection. Safe to call for ids the hub no longer knows.
    pub async fn unregister(&self, conn_id: Uuid) {
        let _ = self.commands.send(HubCommand::Unregister { conn_id }).await;
    }

    /// Deliver a message to every connection of one user.
    pub async fn notify_owner(&self, owner_id: DbId, message: Message) {
        let _ = self
            .commands
            .send(HubCommand::NotifyOwner { owner_id, message })
            .await;
    }

    /// Deliver a message to every live connection, anonymous ones included.
    pub async fn broadcast(&self, message: Message) {
        let _ = self.commands.send(HubCommand::Broadcast { message }).await;
    }

    /// Close every connection and stop the hub task.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(HubCommand::Shutdown).await;
    }

    /// Current connection counts.
    pub async fn stats(&self) -> ConnectionStats {
        *self.stats.read().await
    }
}

/// The hub task's internal state.
pub struct NotificationHub {
    connections: HashMap<Uuid, Connection>,
    owner_index: HashMap<DbId, Vec<Uuid>>,
    stats: Arc<RwLock<ConnectionStats>>,
}

impl NotificationHub {
    /// Spawn the hub task and return a handle plus its join handle.
    pub fn start() -> (HubHandle, JoinHandle<()>) {
        let (commands, receiver) = mpsc::channel(COMMAND_CAPACITY);
        let stats = Arc::new(RwLock::new(ConnectionStats::default()));

        let hub = NotificationHub {
            connections: HashMap::new(),
            owner_index: HashMap::new(),
            stats: Arc::clone(&stats),
        };
        let task = tokio::spawn(hub.run(receiver));

        (HubHandle { commands, stats }, task)
    }

    /// Process commands until shutdown (or until every handle is dropped).
    async fn run(mut self, mut commands: mpsc::Receiver<HubCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                HubCommand::Register {
                    conn_id,
                    owner_id,
                    outbox,
                } => self.register(conn_id, owner_id, outbox).await,
                HubCommand::Unregister { conn_id } => self.unregister(conn_id).await,
                HubCommand::NotifyOwner { owner_id, message } => {
                    self.notify_owner(owner_id, message).await;
                }
                HubCommand::Broadcast { message } => self.broadcast(message).await,
                HubCommand::Shutdown => break,
            }
        }
        self.close_all().await;
        tracing::info!("Notification hub stopped");
    }

    async fn register(&mut self, conn_id: Uuid, owner_id: Option<DbId>, outbox: mpsc::Sender<Message>) {
        // The outbox is freshly created with room to spare, so a failure
        // here means the socket task is already gone.
        if outbox.try_send(welcome_frame(conn_id, owner_id)).is_err() {
            tracing::debug!(%conn_id, "Connection closed before registration completed");
            return;
        }

        self.connections.insert(
            conn_id,
            Connection {
                owner_id,
                outbox,
                connected_at: chrono::Utc::now(),
            },
        );
        if let Some(owner_id) = owner_id {
            self.owner_index.entry(owner_id).or_default().push(conn_id);
        }
        self.refresh_stats().await;
        tracing::info!(%conn_id, authenticated = owner_id.is_some(), "Connection registered");
    }

    async fn unregister(&mut self, conn_id: Uuid) {
        if let Some(conn) = self.remove_connection(conn_id) {
            let connected_secs = (chrono::Utc::now() - conn.connected_at).num_seconds();
            self.refresh_stats().await;
            tracing::info!(%conn_id, connected_secs, "Connection unregistered");
        }
    }

    async fn notify_owner(&mut self, owner_id: DbId, message: Message) {
        let Some(conn_ids) = self.owner_index.get(&owner_id) else {
            tracing::debug!(owner_id, "No live connections for owner, dropping message");
            return;
        };

        let targets = conn_ids.clone();
        let mut evicted = Vec::new();
        for conn_id in targets {
            if !self.push_to(conn_id, message.clone()) {
                evicted.push(conn_id);
            }
        }
        self.evict(evicted).await;
    }

    async fn broadcast(&mut self, message: Message) {
        let targets: Vec<Uuid> = self.connections.keys().copied().collect();
        let mut evicted = Vec::new();
        for conn_id in targets {
            if !self.push_to(conn_id, message.clone()) {
                evicted.push(conn_id);
            }
        }
        self.evict(evicted).await;
    }

    /// Push a message into one connection's outbox without blocking.
    ///
    /// Returns `false` when the connection must be evicted: its outbox is
    /// full (the client stopped draining it) or its socket task is gone.
    fn push_to(&self, conn_id: Uuid, message: Message) -> bool {
        let Some(conn) = self.connections.get(&conn_id) else {
            return true; // already removed, nothing to evict
        };
        match conn.outbox.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(%conn_id, "Outbox full, evicting slow connection");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    async fn evict(&mut self, conn_ids: Vec<Uuid>) {
        if conn_ids.is_empty() {
            return;
        }
        for conn_id in conn_ids {
            self.remove_connection(conn_id);
        }
        self.refresh_stats().await;
    }

    /// Drop a connection from both maps.
    ///
    /// Dropping the returned [`Connection`] closes its outbox, which the
    /// write pump turns into a Close frame toward the client.
    fn remove_connection(&mut self, conn_id: Uuid) -> Option<Connection> {
        let conn = self.connections.remove(&conn_id)?;
        if let Some(owner_id) = conn.owner_id {
            if let Some(conn_ids) = self.owner_index.get_mut(&owner_id) {
                conn_ids.retain(|id| *id != conn_id);
                if conn_ids.is_empty() {
                    self.owner_index.remove(&owner_id);
                }
            }
        }
        Some(conn)
    }

    /// Send a Close frame to every connection, then clear both maps.
    async fn close_all(&mut self) {
        let count = self.connections.len();
        for conn in self.connections.values() {
            let _ = conn.outbox.try_send(Message::Close(None));
        }
        self.connections.clear();
        self.owner_index.clear();
        self.refresh_stats().await;
        tracing::info!(count, "Closed all WebSocket connections");
    }

    async fn refresh_stats(&self) {
        *self.stats.write().await = ConnectionStats {
            total_connections: self.connections.len(),
            distinct_owners: self.owner_index.len(),
        };
    }
}

/// First frame pushed to every connection after registration.
fn welcome_frame(conn_id: Uuid, owner_id: Option<DbId>) -> Message {
    let frame = serde_json::json!({
        "type": MSG_TYPE_WELCOME,
        "owner_id": owner_id,
        "payload": {
            "message": "Connected to notification stream",
            "connection_id": conn_id,
            "authenticated": owner_id.is_some(),
        },
        "timestamp": chrono::Utc::now(),
    });
    Message::Text(frame.to_string().into())
}
