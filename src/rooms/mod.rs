mod msg;
mod new;
mod room;
pub(crate) mod ws;

use axum::{extract::rejection::JsonRejection, routing::{delete, get, post}, Json, Router};
use serde::Deserialize;

use crate::{appresult::ChatError, directory::RoomCode, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-room", post(new::create_room))
        .route("/join-room", post(room::join_room))
        .route("/verify-room-code", post(room::join_room))
        .route("/delete-room", delete(room::delete_room))
        .route("/messages/{room_code}", get(msg::get_messages))
        .route("/delete-messages", delete(msg::delete_messages))
}

/// Unwraps a JSON body, turning an unreadable one into a 400 with `message`.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>, message: &str) -> Result<T, ChatError> {
    payload.map(|Json(body)| body).map_err(|e| {
        tracing::debug!(error = %e, "rejected request body");
        ChatError::validation(message)
    })
}

pub(crate) const BAD_BODY: &str = "Invalid request body";

/// Body shared by the room endpoints. Fields are optional so a missing one
/// becomes a 400 with a readable message instead of a rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RoomBody {
    #[serde(default)]
    room_code: Option<String>,
    #[serde(default)]
    creator: Option<String>,
}

impl RoomBody {
    fn room_code(&self) -> Result<RoomCode, ChatError> {
        RoomCode::parse(self.room_code.as_deref().unwrap_or_default())
    }

    fn creator(&self) -> Result<&str, ChatError> {
        match self.creator.as_deref().map(str::trim) {
            Some(creator) if !creator.is_empty() => Ok(creator),
            _ => Err(ChatError::validation("Creator name is required")),
        }
    }
}
