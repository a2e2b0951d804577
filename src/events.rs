//! JSON frames exchanged over the realtime connection.
//!
//! Every frame is `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};

use crate::{
    appresult::{ChatError, ChatResult},
    directory::RoomCode,
    store::Message,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    JoinRoom(RoomRef),
    RequestMessages(RoomRef),
    SendMessage(SendMessage),
    Typing(Typing),
    StopTyping(RoomRef),
    MessagesDeleted(MessagesDeleted),
}

const CLIENT_EVENTS: &[&str] = &[
    "joinRoom",
    "requestMessages",
    "sendMessage",
    "typing",
    "stopTyping",
    "messagesDeleted",
];

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    #[serde(default)]
    pub room_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    #[serde(default)]
    pub room_code: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    #[serde(default)]
    pub room_code: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesDeleted {
    #[serde(default)]
    pub room_code: Option<String>,
    #[serde(default)]
    pub message_ids: Vec<String>,
}

/// Outbound frames. Serialized with the same envelope as `ClientEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    PreviousMessages(Vec<Message>),
    NewMessage(Message),
    UserTyping { sender: String },
    UserStoppedTyping {},
    #[serde(rename_all = "camelCase")]
    MessagesDeleted { room_code: RoomCode, message_ids: Vec<String> },
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error { message: message.into() }
    }

    pub fn name(&self) -> &'static str {
        use ServerEvent::*;
        match self {
            PreviousMessages(_) => "previousMessages",
            NewMessage(_) => "newMessage",
            UserTyping { .. } => "userTyping",
            UserStoppedTyping {} => "userStoppedTyping",
            MessagesDeleted { .. } => "messagesDeleted",
            Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl ClientEvent {
    pub fn from_json(frame: &str) -> ChatResult<ClientEvent> {
        let Envelope { event, data } = serde_json::from_str(frame).map_err(|e| {
            tracing::debug!(error = %e, "rejected frame");
            ChatError::validation("Malformed event")
        })?;

        if !CLIENT_EVENTS.contains(&event.as_str()) {
            return Err(ChatError::validation(format!("Unknown event: {event}")));
        }

        // `stopTyping` and friends are often sent without a payload
        let data = if data.is_null() { serde_json::json!({}) } else { data };
        serde_json::from_value(serde_json::json!({ "event": &event, "data": data })).map_err(|e| {
            tracing::debug!(error = %e, event = %event, "rejected frame");
            ChatError::validation("Malformed event")
        })
    }

    pub fn name(&self) -> &'static str {
        use ClientEvent::*;
        match self {
            JoinRoom(_) => "joinRoom",
            RequestMessages(_) => "requestMessages",
            SendMessage(_) => "sendMessage",
            Typing(_) => "typing",
            StopTyping(_) => "stopTyping",
            MessagesDeleted(_) => "messagesDeleted",
        }
    }
}

/// Returns the trimmed value, or a validation error naming the field.
pub(crate) fn required<'a>(value: &'a Option<String>, what: &str) -> ChatResult<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ChatError::validation(format!("{what} is required"))),
    }
}

/// Picks the explicit room code, falling back to the joined room.
pub(crate) fn room_or(value: &Option<String>, joined: Option<&RoomCode>) -> ChatResult<RoomCode> {
    match (value.as_deref().map(str::trim), joined) {
        (Some(raw), _) if !raw.is_empty() => RoomCode::parse(raw),
        (_, Some(joined)) => Ok(joined.clone()),
        _ => Err(ChatError::validation("Room code is required")),
    }
}
