//! Per-connection protocol: join, backlog, send, typing, disconnect.
//!
//! A `Session` handles the inbound events of one connection in order. Any
//! failure becomes an `error` event for this connection only; nothing here
//! closes the connection or reaches other members.

use tokio::sync::mpsc;

use crate::{
    appresult::{ChatError, ChatResult},
    channel::ConnectionId,
    directory::RoomCode,
    events::{self, ClientEvent, ServerEvent},
    store::DEFAULT_LIST_LIMIT,
    AppState,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Joined(RoomCode),
}

pub struct Session {
    id: ConnectionId,
    state: SessionState,
    app: AppState,
}

impl Session {
    pub async fn connect(app: AppState) -> (Session, mpsc::UnboundedReceiver<ServerEvent>) {
        let (id, outbound) = app.channel.connect().await;
        tracing::info!(connection = %id, "connected");
        (Session { id, state: SessionState::Connected, app }, outbound)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    fn joined_room(&self) -> Option<&RoomCode> {
        match &self.state {
            SessionState::Joined(room) => Some(room),
            SessionState::Connected => None,
        }
    }

    /// Parses and handles one text frame.
    pub async fn handle_frame(&mut self, frame: &str) {
        match ClientEvent::from_json(frame) {
            Ok(event) => self.handle(event).await,
            Err(e) => self.reply_error(&e, "Malformed event").await,
        }
    }

    pub async fn handle(&mut self, event: ClientEvent) {
        let name = event.name();
        let fallback = match &event {
            ClientEvent::JoinRoom(_) => "Failed to join room",
            ClientEvent::RequestMessages(_) => "Failed to fetch messages",
            ClientEvent::SendMessage(_) => "Failed to send message",
            _ => "Failed to handle event",
        };

        if let Err(e) = self.dispatch(event).await {
            match &e {
                ChatError::Storage(_) => tracing::error!(connection = %self.id, event = name, error = %e, "event failed"),
                _ => tracing::debug!(connection = %self.id, event = name, error = %e, "event rejected"),
            }
            self.reply_error(&e, fallback).await;
        }
    }

    async fn dispatch(&mut self, event: ClientEvent) -> ChatResult<()> {
        match event {
            ClientEvent::JoinRoom(data) => {
                let room = RoomCode::parse(events::required(&data.room_code, "Room code")?)?;
                self.join_room(room).await
            }
            ClientEvent::RequestMessages(data) => {
                let room = events::room_or(&data.room_code, self.joined_room())?;
                self.request_messages(&room).await
            }
            ClientEvent::SendMessage(data) => {
                let (Some(room), Some(sender), Some(message)) = (
                    data.room_code.as_deref().filter(|v| !v.trim().is_empty()),
                    data.sender.as_deref().filter(|v| !v.trim().is_empty()),
                    data.message.as_deref().filter(|v| !v.trim().is_empty()),
                ) else {
                    return Err(ChatError::validation("Room code, sender and message are required"));
                };
                self.send_message(&RoomCode::parse(room)?, sender, message).await
            }
            ClientEvent::Typing(data) => {
                let room = events::room_or(&data.room_code, self.joined_room())?;
                let sender = events::required(&data.sender, "Sender")?;
                self.app.typing.notify_typing(&room, sender, self.id).await;
                Ok(())
            }
            ClientEvent::StopTyping(data) => {
                let room = events::room_or(&data.room_code, self.joined_room())?;
                self.app.typing.notify_stop_typing(&room, self.id).await;
                Ok(())
            }
            ClientEvent::MessagesDeleted(data) => {
                let room = RoomCode::parse(events::required(&data.room_code, "Room code")?)?;
                if data.message_ids.is_empty() {
                    return Err(ChatError::validation("Message IDs are required"));
                }
                let event = ServerEvent::MessagesDeleted { room_code: room.clone(), message_ids: data.message_ids };
                self.app.channel.publish(&room, event, None).await;
                Ok(())
            }
        }
    }

    /// Moves this connection into `room` and sends it the backlog.
    pub async fn join_room(&mut self, room: RoomCode) -> ChatResult<()> {
        self.app.directory.get_room(&room).await?;

        if let Some(left) = self.app.channel.join(self.id, &room).await {
            tracing::debug!(connection = %self.id, room = %left, "left room");
        }
        tracing::info!(connection = %self.id, room = %room, "joined room");
        self.state = SessionState::Joined(room.clone());

        self.request_messages(&room).await
    }

    pub async fn request_messages(&self, room: &RoomCode) -> ChatResult<()> {
        let messages = self.app.store.list_recent(room, DEFAULT_LIST_LIMIT).await?;
        self.reply(ServerEvent::PreviousMessages(messages)).await;
        Ok(())
    }

    /// Stores the message, then broadcasts it to the room, sender included.
    pub async fn send_message(&self, room: &RoomCode, sender: &str, body: &str) -> ChatResult<()> {
        let message = self.app.store.append(room, sender, body).await?;
        self.app.channel.publish(room, ServerEvent::NewMessage(message), None).await;
        Ok(())
    }

    pub async fn disconnect(self) {
        let room = self.app.channel.disconnect(self.id).await;
        tracing::info!(connection = %self.id, room = ?room.as_ref().map(RoomCode::as_str), "disconnected");
    }

    async fn reply(&self, event: ServerEvent) {
        self.app.channel.send_to(self.id, event).await;
    }

    async fn reply_error(&self, err: &ChatError, fallback: &str) {
        self.reply(ServerEvent::error(err.public_message(fallback))).await;
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::{db, store::Message};

    async fn app_with_room(code: &str, creator: &str) -> AppState {
        let app = AppState::new(db::memory_pool().await.unwrap());
        app.directory.create_room(&RoomCode::parse(code).unwrap(), creator).await.unwrap();
        app
    }

    fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn frame(event: &str, data: serde_json::Value) -> String {
        serde_json::json!({ "event": event, "data": data }).to_string()
    }

    fn expect_error(events: &[ServerEvent]) -> &str {
        match events {
            [ServerEvent::Error { message }] => message,
            other => panic!("expected a single error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn join_send_and_echo() {
        let app = app_with_room("R1", "Alice").await;
        let (mut b, mut b_rx) = Session::connect(app.clone()).await;
        assert_eq!(b.state(), &SessionState::Connected);

        b.handle_frame(&frame("joinRoom", serde_json::json!({"roomCode": "r1"}))).await;
        assert_eq!(b.state(), &SessionState::Joined(RoomCode::parse("R1").unwrap()));
        assert_eq!(drain(&mut b_rx), vec![ServerEvent::PreviousMessages(vec![])]);

        b.handle_frame(&frame("sendMessage", serde_json::json!({"roomCode": "r1", "sender": "B", "message": "hi"}))).await;
        let events = drain(&mut b_rx);
        let [ServerEvent::NewMessage(Message { sender, message, room_code, .. })] = events.as_slice() else {
            panic!("expected newMessage, got {events:?}");
        };
        assert_eq!((sender.as_str(), message.as_str(), room_code.as_str()), ("B", "hi", "R1"));

        let stored = app.store.list_recent(&RoomCode::parse("R1").unwrap(), 100).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!((stored[0].sender.as_str(), stored[0].message.as_str()), ("B", "hi"));
    }

    #[tokio::test]
    async fn join_unknown_room_keeps_state() {
        let app = app_with_room("R1", "Alice").await;
        let (mut a, mut a_rx) = Session::connect(app).await;

        a.handle_frame(&frame("joinRoom", serde_json::json!({"roomCode": "r1"}))).await;
        drain(&mut a_rx);

        a.handle_frame(&frame("joinRoom", serde_json::json!({"roomCode": "missing"}))).await;
        assert_eq!(expect_error(&drain(&mut a_rx)), "Room not found");
        assert_eq!(a.state(), &SessionState::Joined(RoomCode::parse("R1").unwrap()));
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let app = app_with_room("R1", "Alice").await;
        app.directory.create_room(&RoomCode::parse("R2").unwrap(), "Alice").await.unwrap();

        let (mut a, mut a_rx) = Session::connect(app.clone()).await;
        let (mut b, mut b_rx) = Session::connect(app.clone()).await;
        a.join_room(RoomCode::parse("R1").unwrap()).await.unwrap();
        b.join_room(RoomCode::parse("R2").unwrap()).await.unwrap();
        drain(&mut a_rx);
        drain(&mut b_rx);

        a.handle_frame(&frame("sendMessage", serde_json::json!({"roomCode": "R1", "sender": "A", "message": "secret"}))).await;
        a.handle_frame(&frame("typing", serde_json::json!({"roomCode": "R1", "sender": "A"}))).await;

        assert_eq!(drain(&mut a_rx).len(), 1);
        assert!(drain(&mut b_rx).is_empty());
    }

    #[tokio::test]
    async fn typing_goes_to_others_only() {
        let app = app_with_room("R1", "Alice").await;
        let (mut x, mut x_rx) = Session::connect(app.clone()).await;
        let (mut y, mut y_rx) = Session::connect(app.clone()).await;
        x.join_room(RoomCode::parse("R1").unwrap()).await.unwrap();
        y.join_room(RoomCode::parse("R1").unwrap()).await.unwrap();
        drain(&mut x_rx);
        drain(&mut y_rx);

        x.handle_frame(&frame("typing", serde_json::json!({"roomCode": "r1", "sender": "X"}))).await;
        x.handle_frame(r#"{"event":"stopTyping"}"#).await;

        assert!(drain(&mut x_rx).is_empty());
        assert_eq!(drain(&mut y_rx), vec![
            ServerEvent::UserTyping { sender: "X".into() },
            ServerEvent::UserStoppedTyping {},
        ]);
    }

    #[tokio::test]
    async fn validation_errors_are_scoped() {
        let app = app_with_room("R1", "Alice").await;
        let (mut a, mut a_rx) = Session::connect(app.clone()).await;
        let (mut b, mut b_rx) = Session::connect(app.clone()).await;
        a.join_room(RoomCode::parse("R1").unwrap()).await.unwrap();
        b.join_room(RoomCode::parse("R1").unwrap()).await.unwrap();
        drain(&mut a_rx);
        drain(&mut b_rx);

        a.handle_frame(&frame("sendMessage", serde_json::json!({"roomCode": "R1", "sender": "A"}))).await;
        assert_eq!(expect_error(&drain(&mut a_rx)), "Room code, sender and message are required");

        a.handle_frame(&frame("sendMessage", serde_json::json!({"roomCode": "R1", "sender": "A", "message": "<script>x</script>"}))).await;
        assert_eq!(expect_error(&drain(&mut a_rx)), "Sender and message are required");

        a.handle_frame("{{{").await;
        assert_eq!(expect_error(&drain(&mut a_rx)), "Malformed event");

        a.handle_frame(&frame("joinRoom", serde_json::json!({}))).await;
        assert_eq!(expect_error(&drain(&mut a_rx)), "Room code is required");

        assert!(drain(&mut b_rx).is_empty());

        a.handle_frame(&frame("sendMessage", serde_json::json!({"roomCode": "R1", "sender": "A", "message": "still here"}))).await;
        assert_eq!(drain(&mut a_rx).len(), 1);
        assert_eq!(drain(&mut b_rx).len(), 1);
    }

    #[tokio::test]
    async fn request_messages_is_private() {
        let app = app_with_room("R1", "Alice").await;
        let (mut a, mut a_rx) = Session::connect(app.clone()).await;
        let (mut b, mut b_rx) = Session::connect(app.clone()).await;
        a.join_room(RoomCode::parse("R1").unwrap()).await.unwrap();
        b.join_room(RoomCode::parse("R1").unwrap()).await.unwrap();
        a.send_message(&RoomCode::parse("R1").unwrap(), "A", "one").await.unwrap();
        drain(&mut a_rx);
        drain(&mut b_rx);

        a.handle_frame(r#"{"event":"requestMessages"}"#).await;
        let events = drain(&mut a_rx);
        assert!(matches!(events.as_slice(), [ServerEvent::PreviousMessages(list)] if list.len() == 1));
        assert!(drain(&mut b_rx).is_empty());
    }

    #[tokio::test]
    async fn request_messages_without_room_needs_code() {
        let app = app_with_room("R1", "Alice").await;
        let (mut a, mut a_rx) = Session::connect(app).await;
        a.handle_frame(r#"{"event":"requestMessages","data":{}}"#).await;
        assert_eq!(expect_error(&drain(&mut a_rx)), "Room code is required");
    }

    #[tokio::test]
    async fn messages_deleted_is_rebroadcast() {
        let app = app_with_room("R1", "Alice").await;
        let (mut a, mut a_rx) = Session::connect(app.clone()).await;
        let (mut b, mut b_rx) = Session::connect(app.clone()).await;
        a.join_room(RoomCode::parse("R1").unwrap()).await.unwrap();
        b.join_room(RoomCode::parse("R1").unwrap()).await.unwrap();
        drain(&mut a_rx);
        drain(&mut b_rx);

        a.handle_frame(&frame("messagesDeleted", serde_json::json!({"roomCode": "r1", "messageIds": ["m1"]}))).await;
        let expected = ServerEvent::MessagesDeleted {
            room_code: RoomCode::parse("R1").unwrap(),
            message_ids: vec!["m1".into()],
        };
        assert_eq!(drain(&mut a_rx), vec![expected.clone()]);
        assert_eq!(drain(&mut b_rx), vec![expected]);

        a.handle_frame(&frame("messagesDeleted", serde_json::json!({"roomCode": "r1", "messageIds": []}))).await;
        assert_eq!(expect_error(&drain(&mut a_rx)), "Message IDs are required");
    }

    #[tokio::test]
    async fn switching_rooms_leaves_the_old_one() {
        let app = app_with_room("R1", "Alice").await;
        app.directory.create_room(&RoomCode::parse("R2").unwrap(), "Alice").await.unwrap();
        let (mut a, _a_rx) = Session::connect(app.clone()).await;

        a.join_room(RoomCode::parse("R1").unwrap()).await.unwrap();
        a.join_room(RoomCode::parse("R2").unwrap()).await.unwrap();
        assert_eq!(app.channel.member_count(&RoomCode::parse("R1").unwrap()).await, 0);
        assert_eq!(app.channel.member_count(&RoomCode::parse("R2").unwrap()).await, 1);
    }

    #[tokio::test]
    async fn disconnect_deregisters() {
        let app = app_with_room("R1", "Alice").await;
        let (mut a, _a_rx) = Session::connect(app.clone()).await;
        a.join_room(RoomCode::parse("R1").unwrap()).await.unwrap();

        a.disconnect().await;
        assert_eq!(app.channel.member_count(&RoomCode::parse("R1").unwrap()).await, 0);
    }

    #[tokio::test]
    async fn send_to_deleted_room_fails() {
        let app = app_with_room("R1", "Alice").await;
        let (mut a, mut a_rx) = Session::connect(app.clone()).await;
        a.join_room(RoomCode::parse("R1").unwrap()).await.unwrap();
        drain(&mut a_rx);

        app.directory.delete_room(&RoomCode::parse("R1").unwrap(), "Alice", &app.store).await.unwrap();
        a.handle_frame(&frame("sendMessage", serde_json::json!({"roomCode": "R1", "sender": "A", "message": "hi"}))).await;
        assert_eq!(expect_error(&drain(&mut a_rx)), "Room not found");
    }
}
