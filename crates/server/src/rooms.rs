use dashmap::DashMap;
use shared::ServerToClient;
use std::collections::HashSet;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A real-time room scope. Session rooms carry chat, stats and checkpoint
/// events; deck rooms carry slide position, reactions and bookmarks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomKey {
    Session(String),
    Deck(String),
}

/// Tracks which socket connections are members of which rooms and fans
/// messages out to them. Owned by `AppState` and injected into the event
/// router; membership is process-local (a multi-instance deployment would
/// need an external broadcast backplane).
pub struct RoomRegistry {
    /// Map of connection ID -> sender to that client's socket task
    senders: DashMap<Uuid, mpsc::Sender<ServerToClient>>,
    /// Map of room key -> member connection IDs
    rooms: DashMap<RoomKey, HashSet<Uuid>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            senders: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    // Connection management

    pub fn register(&self, conn_id: Uuid, sender: mpsc::Sender<ServerToClient>) {
        self.senders.insert(conn_id, sender);
        tracing::debug!("connection registered: {}", conn_id);
    }

    /// Drop a connection and remove it from every room it joined
    pub fn unregister(&self, conn_id: &Uuid) {
        self.senders.remove(conn_id);
        self.rooms.retain(|_, members| {
            members.remove(conn_id);
            !members.is_empty()
        });
        tracing::debug!("connection unregistered: {}", conn_id);
    }

    // Room membership

    pub fn join(&self, room: RoomKey, conn_id: Uuid) {
        self.rooms.entry(room).or_default().insert(conn_id);
    }

    pub fn leave(&self, room: &RoomKey, conn_id: &Uuid) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(conn_id);
        }
    }

    pub fn is_member(&self, room: &RoomKey, conn_id: &Uuid) -> bool {
        self.rooms
            .get(room)
            .map(|members| members.contains(conn_id))
            .unwrap_or(false)
    }

    pub fn room_size(&self, room: &RoomKey) -> usize {
        self.rooms.get(room).map(|members| members.len()).unwrap_or(0)
    }

    // Message routing

    /// Send to a single connection; a closed channel is treated as gone
    pub async fn send_to(&self, conn_id: &Uuid, msg: ServerToClient) -> bool {
        let sender = match self.senders.get(conn_id) {
            Some(entry) => entry.value().clone(),
            None => return false,
        };
        sender.send(msg).await.is_ok()
    }

    /// Fan a message out to every member of a room. Send failures are
    /// swallowed; the disconnect path cleans the membership up.
    pub async fn broadcast(&self, room: &RoomKey, msg: ServerToClient) {
        let targets = self.collect_senders(room);
        for sender in targets {
            let _ = sender.send(msg.clone()).await;
        }
    }

    /// Senders are cloned out before any await so no map guard is held
    /// across a suspension point.
    fn collect_senders(&self, room: &RoomKey) -> Vec<mpsc::Sender<ServerToClient>> {
        let member_ids: Vec<Uuid> = match self.rooms.get(room) {
            Some(members) => members.iter().copied().collect(),
            None => return Vec::new(),
        };
        member_ids
            .iter()
            .filter_map(|id| self.senders.get(id).map(|entry| entry.value().clone()))
            .collect()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(registry: &RoomRegistry) -> (Uuid, mpsc::Receiver<ServerToClient>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(8);
        registry.register(conn_id, tx);
        (conn_id, rx)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_room_members_only() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = connect(&registry);
        let (b, mut rx_b) = connect(&registry);
        let (_c, mut rx_c) = connect(&registry);

        let room = RoomKey::Session("sess-1".to_string());
        registry.join(room.clone(), a);
        registry.join(room.clone(), b);
        // c never joins

        registry
            .broadcast(&room, ServerToClient::error("ping"))
            .await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rooms_are_isolated_by_key() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = connect(&registry);
        let (b, mut rx_b) = connect(&registry);

        registry.join(RoomKey::Session("sess-1".to_string()), a);
        registry.join(RoomKey::Session("sess-2".to_string()), b);

        registry
            .broadcast(
                &RoomKey::Session("sess-1".to_string()),
                ServerToClient::SlideChanged {
                    deck_id: "d".to_string(),
                    slide_index: 3,
                },
            )
            .await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_session_and_deck_rooms_do_not_collide() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = connect(&registry);

        registry.join(RoomKey::Session("x".to_string()), a);
        registry
            .broadcast(&RoomKey::Deck("x".to_string()), ServerToClient::error("?"))
            .await;
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister_removes_membership_everywhere() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = connect(&registry);
        let room1 = RoomKey::Session("s1".to_string());
        let room2 = RoomKey::Deck("d1".to_string());
        registry.join(room1.clone(), a);
        registry.join(room2.clone(), a);

        registry.unregister(&a);

        assert_eq!(registry.room_size(&room1), 0);
        assert_eq!(registry.room_size(&room2), 0);
        assert!(!registry.send_to(&a, ServerToClient::error("x")).await);
    }

    #[tokio::test]
    async fn test_leave_is_scoped_to_one_room() {
        let registry = RoomRegistry::new();
        let (a, _rx) = connect(&registry);
        let room1 = RoomKey::Session("s1".to_string());
        let room2 = RoomKey::Session("s2".to_string());
        registry.join(room1.clone(), a);
        registry.join(room2.clone(), a);

        registry.leave(&room1, &a);

        assert!(!registry.is_member(&room1, &a));
        assert!(registry.is_member(&room2, &a));
    }
}
