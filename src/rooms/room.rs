use axum::{debug_handler, extract::{rejection::JsonRejection, State}, Json};
use serde_json::{json, Value};

use crate::{directory::RoomDirectory, store::MessageStore, AppResult};

use super::{json_body, RoomBody, BAD_BODY};

/// Confirms a room exists before the client opens its realtime connection.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn join_room(
    State(directory): State<RoomDirectory>,
    payload: Result<Json<RoomBody>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let body = json_body(payload, BAD_BODY)?;
    let room = directory.get_room(&body.room_code()?).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Room found",
        "roomCode": room.code,
        "creator": room.creator,
    })))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete_room(
    State(directory): State<RoomDirectory>,
    State(store): State<MessageStore>,
    payload: Result<Json<RoomBody>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let body = json_body(payload, BAD_BODY)?;
    let code = body.room_code()?;
    let creator = body.creator()?;

    directory.delete_room(&code, creator, &store).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Room and all messages deleted successfully",
    })))
}
