//! Room membership registry and fan-out.
//!
//! Every connection registers an outbound queue when it connects. Joining a
//! room moves the connection into that room's member set; a connection is a
//! member of at most one room. Both directions of the mapping live under one
//! lock so join, leave and publish always see a consistent registry.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::{directory::RoomCode, events::ServerEvent};

pub type ConnectionId = Uuid;
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

struct Member {
    outbox: Outbox,
    room: Option<RoomCode>,
}

#[derive(Default)]
struct Registry {
    members: HashMap<ConnectionId, Member>,
    rooms: HashMap<RoomCode, HashSet<ConnectionId>>,
}

impl Registry {
    fn detach(&mut self, connection_id: ConnectionId) -> Option<RoomCode> {
        let room = self.members.get_mut(&connection_id)?.room.take()?;
        if let Some(set) = self.rooms.get_mut(&room) {
            set.remove(&connection_id);
            if set.is_empty() {
                self.rooms.remove(&room);
            }
        }
        Some(room)
    }
}

#[derive(Clone, Default)]
pub struct RoomChannel {
    registry: Arc<RwLock<Registry>>,
}

impl RoomChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection and returns its id and the receiving end of
    /// its outbound queue.
    pub async fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let connection_id = Uuid::now_v7();
        self.registry
            .write()
            .await
            .members
            .insert(connection_id, Member { outbox, room: None });
        (connection_id, inbox)
    }

    /// Puts the connection in `room`, leaving any previous room. Returns the
    /// room that was left, if any. Unknown connections are ignored.
    pub async fn join(&self, connection_id: ConnectionId, room: &RoomCode) -> Option<RoomCode> {
        let mut registry = self.registry.write().await;
        if !registry.members.contains_key(&connection_id) {
            return None;
        }

        let previous = registry.detach(connection_id);
        registry.rooms.entry(room.clone()).or_default().insert(connection_id);
        if let Some(member) = registry.members.get_mut(&connection_id) {
            member.room = Some(room.clone());
        }
        previous.filter(|previous| previous != room)
    }

    pub async fn leave(&self, connection_id: ConnectionId) -> Option<RoomCode> {
        self.registry.write().await.detach(connection_id)
    }

    /// Leaves the current room and drops the outbound queue.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Option<RoomCode> {
        let mut registry = self.registry.write().await;
        let room = registry.detach(connection_id);
        registry.members.remove(&connection_id);
        room
    }

    /// Delivers `event` to every member of `room` except `exclude`. Returns
    /// how many connections it was queued for; an empty room is not an error.
    pub async fn publish(&self, room: &RoomCode, event: ServerEvent, exclude: Option<ConnectionId>) -> usize {
        let registry = self.registry.read().await;
        let Some(set) = registry.rooms.get(room) else {
            return 0;
        };

        let mut delivered = 0;
        for connection_id in set {
            if Some(*connection_id) == exclude {
                continue;
            }
            let Some(member) = registry.members.get(connection_id) else {
                continue;
            };
            if member.outbox.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Sends `event` to a single connection.
    pub async fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let registry = self.registry.read().await;
        registry
            .members
            .get(&connection_id)
            .is_some_and(|member| member.outbox.send(event).is_ok())
    }

    pub async fn room_of(&self, connection_id: ConnectionId) -> Option<RoomCode> {
        self.registry.read().await.members.get(&connection_id)?.room.clone()
    }

    pub async fn member_count(&self, room: &RoomCode) -> usize {
        self.registry.read().await.rooms.get(room).map_or(0, HashSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(raw: &str) -> RoomCode {
        RoomCode::parse(raw).unwrap()
    }

    fn typing(sender: &str) -> ServerEvent {
        ServerEvent::UserTyping { sender: sender.to_owned() }
    }

    #[tokio::test]
    async fn publish_reaches_room_members_only() {
        let channel = RoomChannel::new();
        let (a, mut a_rx) = channel.connect().await;
        let (b, mut b_rx) = channel.connect().await;
        let (c, mut c_rx) = channel.connect().await;
        channel.join(a, &code("r1")).await;
        channel.join(b, &code("r1")).await;
        channel.join(c, &code("r2")).await;

        assert_eq!(channel.publish(&code("r1"), typing("x"), None).await, 2);
        assert_eq!(a_rx.try_recv().unwrap(), typing("x"));
        assert_eq!(b_rx.try_recv().unwrap(), typing("x"));
        assert!(c_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_skips_excluded_connection() {
        let channel = RoomChannel::new();
        let (a, mut a_rx) = channel.connect().await;
        let (b, mut b_rx) = channel.connect().await;
        channel.join(a, &code("r1")).await;
        channel.join(b, &code("r1")).await;

        assert_eq!(channel.publish(&code("r1"), typing("a"), Some(a)).await, 1);
        assert!(a_rx.try_recv().is_err());
        assert_eq!(b_rx.try_recv().unwrap(), typing("a"));
    }

    #[tokio::test]
    async fn empty_room_publish_is_noop() {
        let channel = RoomChannel::new();
        assert_eq!(channel.publish(&code("nobody"), typing("x"), None).await, 0);
    }

    #[tokio::test]
    async fn join_moves_between_rooms() {
        let channel = RoomChannel::new();
        let (a, mut a_rx) = channel.connect().await;

        assert_eq!(channel.join(a, &code("r1")).await, None);
        assert_eq!(channel.join(a, &code("r1")).await, None);
        assert_eq!(channel.member_count(&code("r1")).await, 1);

        assert_eq!(channel.join(a, &code("r2")).await, Some(code("r1")));
        assert_eq!(channel.member_count(&code("r1")).await, 0);
        assert_eq!(channel.room_of(a).await, Some(code("r2")));

        channel.publish(&code("r1"), typing("old"), None).await;
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_removes_membership() {
        let channel = RoomChannel::new();
        let (a, _a_rx) = channel.connect().await;
        channel.join(a, &code("r1")).await;

        assert_eq!(channel.disconnect(a).await, Some(code("r1")));
        assert_eq!(channel.member_count(&code("r1")).await, 0);
        assert_eq!(channel.join(a, &code("r1")).await, None);
        assert_eq!(channel.member_count(&code("r1")).await, 0);
        assert!(!channel.send_to(a, typing("x")).await);
    }

    #[tokio::test]
    async fn concurrent_joins_keep_sets_consistent() {
        let channel = RoomChannel::new();
        let mut handles = Vec::new();
        for i in 0..50 {
            let channel = channel.clone();
            handles.push(tokio::spawn(async move {
                let (id, rx) = channel.connect().await;
                channel.join(id, &code(if i % 2 == 0 { "even" } else { "odd" })).await;
                if i % 5 == 0 {
                    channel.leave(id).await;
                }
                (id, rx)
            }));
        }
        let mut connections = Vec::new();
        for handle in handles {
            connections.push(handle.await.unwrap());
        }

        assert_eq!(channel.member_count(&code("even")).await, 20);
        assert_eq!(channel.member_count(&code("odd")).await, 20);
        drop(connections);
    }
}
