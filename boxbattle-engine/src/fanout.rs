//! Per-battle subscriber registry.
//!
//! Connections are unbounded channels of serialized event frames. A send
//! failure means the receiving side went away; such connections are dropped
//! on the next broadcast to their battle.

use crate::battle::BattleEvent;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Sending half of a subscriber.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<String>,
}

impl Connection {
    /// A connection plus the receiver its owner reads frames from.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                id: ConnectionId::new(),
                sender,
            },
            receiver,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// False once the receiver has been dropped.
    pub fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).is_ok()
    }
}

#[derive(Debug, Default)]
pub struct EventFanout {
    battles: RwLock<HashMap<Uuid, HashMap<ConnectionId, Connection>>>,
}

impl EventFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, battle_id: Uuid, connection: Connection) {
        tracing::debug!(battle_id = %battle_id, connection = %connection.id(), "Subscribed");
        self.battles
            .write()
            .entry(battle_id)
            .or_default()
            .insert(connection.id(), connection);
    }

    pub fn unsubscribe(&self, battle_id: Uuid, connection_id: ConnectionId) {
        let mut battles = self.battles.write();
        if let Some(connections) = battles.get_mut(&battle_id) {
            connections.remove(&connection_id);
            if connections.is_empty() {
                battles.remove(&battle_id);
            }
        }
    }

    pub fn subscriber_count(&self, battle_id: Uuid) -> usize {
        self.battles
            .read()
            .get(&battle_id)
            .map(|connections| connections.len())
            .unwrap_or(0)
    }

    /// Deliver one event to every live subscriber of the battle. Returns the
    /// number of connections that accepted it.
    pub fn broadcast(&self, battle_id: Uuid, event: &BattleEvent) -> usize {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(battle_id = %battle_id, "Failed to serialize event: {}", e);
                return 0;
            }
        };
        self.send_frame(battle_id, &frame)
    }

    /// Send to a single connection without registering it.
    pub fn send_to(&self, connection: &Connection, event: &BattleEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(frame) => connection.send(&frame),
            Err(e) => {
                tracing::error!("Failed to serialize event: {}", e);
                false
            }
        }
    }

    fn send_frame(&self, battle_id: Uuid, frame: &str) -> usize {
        let dead: Vec<ConnectionId> = {
            let battles = self.battles.read();
            let Some(connections) = battles.get(&battle_id) else {
                return 0;
            };
            connections
                .values()
                .filter(|connection| !connection.send(frame))
                .map(|connection| connection.id())
                .collect()
        };

        let mut battles = self.battles.write();
        let Some(connections) = battles.get_mut(&battle_id) else {
            return 0;
        };
        for id in &dead {
            tracing::debug!(battle_id = %battle_id, connection = %id, "Pruned dead subscriber");
            connections.remove(id);
        }
        let delivered = connections.len();
        if delivered == 0 {
            battles.remove(&battle_id);
        }
        delivered
    }
}
