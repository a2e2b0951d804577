use axum::{debug_handler, extract::{rejection::JsonRejection, Path, Query, State}, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    appresult::ChatError,
    directory::RoomCode,
    store::{Message, MessageStore, DEFAULT_LIST_LIMIT},
    AppResult,
};

use super::json_body;

const MISSING_IDS: &str = "Room code and message IDs are required";

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesQuery {
    limit: Option<u32>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn get_messages(
    Path(room_code): Path<String>,
    Query(MessagesQuery { limit }): Query<MessagesQuery>,
    State(store): State<MessageStore>,
) -> AppResult<Json<Vec<Message>>> {
    let room_code = RoomCode::parse(&room_code)?;
    let messages = store.list_recent(&room_code, limit.unwrap_or(DEFAULT_LIST_LIMIT)).await?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteMessagesBody {
    #[serde(default)]
    room_code: Option<String>,
    #[serde(default)]
    message_ids: Option<Vec<String>>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete_messages(
    State(store): State<MessageStore>,
    payload: Result<Json<DeleteMessagesBody>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let DeleteMessagesBody { room_code, message_ids } = json_body(payload, MISSING_IDS)?;
    let (Some(room_code), Some(message_ids)) = (room_code, message_ids) else {
        return Err(ChatError::validation(MISSING_IDS).into());
    };
    let room_code = RoomCode::parse(&room_code)?;

    let deleted = store.delete_by_ids(&room_code, &message_ids).await?;
    tracing::info!(room = %room_code, deleted, "messages deleted");

    Ok(Json(json!({
        "success": true,
        "message": format!("{deleted} message(s) deleted"),
        "deletedCount": deleted,
    })))
}
