use axum::{debug_handler, extract::{rejection::JsonRejection, State}, Json};
use serde_json::{json, Value};

use crate::{directory::RoomDirectory, AppResult};

use super::{json_body, RoomBody, BAD_BODY};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create_room(
    State(directory): State<RoomDirectory>,
    payload: Result<Json<RoomBody>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let body = json_body(payload, BAD_BODY)?;
    let code = body.room_code()?;
    let creator = body.creator()?;

    let code = directory.create_room(&code, creator).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Room created successfully",
        "roomCode": code,
    })))
}
