use crate::{
    channel::{ConnectionId, RoomChannel},
    directory::RoomCode,
    events::ServerEvent,
};

/// Forwards typing signals to the other members of a room. Nothing is kept
/// between calls; receivers decide how long an indicator stays visible.
#[derive(Clone)]
pub struct TypingRelay {
    channel: RoomChannel,
}

impl TypingRelay {
    pub fn new(channel: RoomChannel) -> Self {
        Self { channel }
    }

    pub async fn notify_typing(&self, room: &RoomCode, sender: &str, caller: ConnectionId) -> usize {
        let event = ServerEvent::UserTyping { sender: sender.to_owned() };
        self.channel.publish(room, event, Some(caller)).await
    }

    pub async fn notify_stop_typing(&self, room: &RoomCode, caller: ConnectionId) -> usize {
        self.channel.publish(room, ServerEvent::UserStoppedTyping {}, Some(caller)).await
    }
}
