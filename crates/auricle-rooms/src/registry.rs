//! Peer↔room membership and broadcast fan-out.
//!
//! Two-index session bookkeeping: one map keyed by peer, one keyed by room,
//! both behind a single lock so a room change is atomic from any external
//! observer's point of view.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

pub type Sender = mpsc::UnboundedSender<serde_json::Value>;

#[derive(Default)]
struct Membership {
    peer_room: HashMap<String, String>,
    room_peers: HashMap<String, HashSet<String>>,
}

#[derive(Default)]
pub struct Registry {
    membership: RwLock<Membership>,
    senders: RwLock<HashMap<String, Sender>>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a peer's outbound channel. Called on signaling connect,
    /// before the peer has joined any room.
    pub async fn register_peer(&self, peer_id: &str, sender: Sender) {
        self.senders.write().await.insert(peer_id.to_string(), sender);
    }

    /// Removes a peer entirely: drops its channel and leaves its room.
    pub async fn unregister_peer(&self, peer_id: &str) {
        self.leave_room(peer_id).await;
        self.senders.write().await.remove(peer_id);
    }

    /// Atomically removes the peer from its prior room (if any, garbage
    /// collecting it if now empty) and adds it to `room_id` (creating it if
    /// absent).
    pub async fn join_room(&self, peer_id: &str, room_id: &str) {
        let mut membership = self.membership.write().await;
        Self::remove_from_current_room(&mut membership, peer_id);
        membership
            .peer_room
            .insert(peer_id.to_string(), room_id.to_string());
        membership
            .room_peers
            .entry(room_id.to_string())
            .or_default()
            .insert(peer_id.to_string());
    }

    /// Removes a peer from its current room, if any. Idempotent.
    pub async fn leave_room(&self, peer_id: &str) {
        let mut membership = self.membership.write().await;
        Self::remove_from_current_room(&mut membership, peer_id);
    }

    fn remove_from_current_room(membership: &mut Membership, peer_id: &str) {
        if let Some(prev_room) = membership.peer_room.remove(peer_id) {
            if let Some(set) = membership.room_peers.get_mut(&prev_room) {
                set.remove(peer_id);
                if set.is_empty() {
                    membership.room_peers.remove(&prev_room);
                }
            }
        }
    }

    pub async fn current_room(&self, peer_id: &str) -> Option<String> {
        self.membership.read().await.peer_room.get(peer_id).cloned()
    }

    pub async fn room_members(&self, room_id: &str) -> Vec<String> {
        self.membership
            .read()
            .await
            .room_peers
            .get(room_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Serializes `payload` and writes it to every live peer in `room_id`.
    /// A single broken channel never aborts the rest of the fanout.
    pub async fn broadcast(&self, room_id: &str, payload: serde_json::Value) {
        let members = self.room_members(room_id).await;
        let senders = self.senders.read().await;

        for peer_id in members {
            if let Some(sender) = senders.get(&peer_id) {
                if let Err(err) = sender.send(payload.clone()) {
                    tracing::debug!(peer = %peer_id, error = %err, "dropping broadcast to disconnected peer");
                }
            }
        }
    }
}

impl auricle_forward::Broadcast for Registry {
    async fn broadcast(&self, room_id: &str, payload: serde_json::Value) {
        Registry::broadcast(self, room_id, payload).await
    }
}
