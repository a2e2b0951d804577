//! Room records: existence and creator ownership.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::{
    appresult::{ChatError, ChatResult},
    db,
    store::MessageStore,
};

/// Canonical (trimmed, uppercase) room code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    pub fn parse(raw: &str) -> ChatResult<RoomCode> {
        let code = raw.trim().to_uppercase();
        if code.is_empty() {
            return Err(ChatError::validation("Room code is required"));
        }
        Ok(RoomCode(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ChatError;

    fn try_from(raw: String) -> ChatResult<RoomCode> {
        RoomCode::parse(&raw)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> String {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub code: RoomCode,
    pub creator: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct RoomDirectory {
    db_pool: SqlitePool,
}

impl RoomDirectory {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    pub async fn create_room(&self, code: &RoomCode, creator: &str) -> ChatResult<RoomCode> {
        let creator = creator.trim();
        if creator.is_empty() {
            return Err(ChatError::validation("Creator name is required"));
        }

        let result = sqlx::query("INSERT INTO rooms (code,creator,created_at) VALUES (?,?,?)")
            .bind(code.as_str())
            .bind(creator)
            .bind(db::to_millis(db::now_millis()))
            .execute(&self.db_pool)
            .await;

        match result {
            Ok(_) => {
                tracing::info!(room = %code, creator, "room created");
                Ok(code.clone())
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(ChatError::Conflict("Room code already exists".to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_room(&self, code: &RoomCode) -> ChatResult<Room> {
        let Some((creator, created_at)): Option<(String, i64)> =
            sqlx::query_as("SELECT creator,created_at FROM rooms WHERE code=?")
                .bind(code.as_str())
                .fetch_optional(&self.db_pool)
                .await?
        else {
            return Err(ChatError::not_found("Room not found"));
        };

        Ok(Room {
            code: code.clone(),
            creator,
            created_at: db::from_millis(created_at)?,
        })
    }

    /// Removes the room and every message in it. Connected members are not
    /// told; that is up to the caller.
    pub async fn delete_room(&self, code: &RoomCode, requester: &str, store: &MessageStore) -> ChatResult<u64> {
        let requester = requester.trim();
        if requester.is_empty() {
            return Err(ChatError::validation("Creator name is required"));
        }

        let room = self.get_room(code).await?;
        if room.creator != requester {
            return Err(ChatError::Forbidden("Only room creator can delete the room".to_owned()));
        }

        let deleted = store.delete_all_for_room(code).await?;
        sqlx::query("DELETE FROM rooms WHERE code=?")
            .bind(code.as_str())
            .execute(&self.db_pool)
            .await?;

        tracing::info!(room = %code, messages = deleted, "room deleted");
        Ok(deleted)
    }
}
