//! Durable per-room message log.

use std::{sync::LazyLock, time::Duration};

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    appresult::{ChatError, ChatResult},
    db,
    directory::RoomCode,
};

pub const MAX_SENDER_CHARS: usize = 50;
pub const MAX_BODY_CHARS: usize = 1000;
pub const DEFAULT_LIST_LIMIT: u32 = 100;
pub const MAX_LIST_LIMIT: u32 = 1000;

static SCRIPT_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("script tag pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub room_code: RoomCode,
    pub sender: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

type MessageRow = (String, String, String, String, i64);

impl TryFrom<MessageRow> for Message {
    type Error = sqlx::Error;

    fn try_from((id, room_code, sender, message, timestamp): MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id,
            room_code: RoomCode::parse(&room_code).map_err(|e| sqlx::Error::Decode(e.to_string().into()))?,
            sender,
            message,
            timestamp: db::from_millis(timestamp)?,
        })
    }
}

/// Removes `<script>…</script>` blocks. This is a courtesy filter, not an
/// injection guard: clients must still escape message text when rendering.
pub fn strip_script_tags(body: &str) -> String {
    SCRIPT_TAG.replace_all(body, "").into_owned()
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[derive(Clone)]
pub struct MessageStore {
    db_pool: SqlitePool,
}

impl MessageStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    pub async fn append(&self, room_code: &RoomCode, sender: &str, body: &str) -> ChatResult<Message> {
        self.append_at(room_code, sender, body, db::now_millis()).await
    }

    pub(crate) async fn append_at(
        &self,
        room_code: &RoomCode,
        sender: &str,
        body: &str,
        timestamp: OffsetDateTime,
    ) -> ChatResult<Message> {
        let sender = truncate_chars(sender.trim(), MAX_SENDER_CHARS).trim_end();
        let body = strip_script_tags(truncate_chars(body.trim(), MAX_BODY_CHARS));
        let body = body.trim();

        if sender.is_empty() || body.is_empty() {
            return Err(ChatError::validation("Sender and message are required"));
        }

        let id = Uuid::now_v7().to_string();
        let inserted = sqlx::query(
            "INSERT INTO messages (id,room_code,sender,message,timestamp)
             SELECT ?,?,?,?,? WHERE EXISTS (SELECT 1 FROM rooms WHERE code=?)",
        )
        .bind(&id)
        .bind(room_code.as_str())
        .bind(sender)
        .bind(body)
        .bind(db::to_millis(timestamp))
        .bind(room_code.as_str())
        .execute(&self.db_pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(ChatError::not_found("Room not found"));
        }

        Ok(Message {
            id,
            room_code: room_code.clone(),
            sender: sender.to_owned(),
            message: body.to_owned(),
            timestamp,
        })
    }

    /// The newest `limit` messages of a room, oldest first.
    pub async fn list_recent(&self, room_code: &RoomCode, limit: u32) -> ChatResult<Vec<Message>> {
        let limit = limit.min(MAX_LIST_LIMIT);
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id,room_code,sender,message,timestamp FROM (
                SELECT rowid AS seq,id,room_code,sender,message,timestamp FROM messages
                WHERE room_code=? ORDER BY timestamp DESC, seq DESC LIMIT ?
             ) ORDER BY timestamp ASC, seq ASC",
        )
        .bind(room_code.as_str())
        .bind(limit)
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter()
            .map(|row| Message::try_from(row).map_err(ChatError::from))
            .collect()
    }

    /// Deletes the listed messages that belong to `room_code`. Ids from other
    /// rooms are ignored.
    pub async fn delete_by_ids(&self, room_code: &RoomCode, ids: &[String]) -> ChatResult<u64> {
        if ids.is_empty() {
            return Err(ChatError::validation("Room code and message IDs are required"));
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM messages WHERE room_code=");
        query.push_bind(room_code.as_str());
        query.push(" AND id IN (");
        let mut separated = query.separated(",");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let result = query.build().execute(&self.db_pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_all_for_room(&self, room_code: &RoomCode) -> ChatResult<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE room_code=?")
            .bind(room_code.as_str())
            .execute(&self.db_pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Deletes every message older than `now - horizon`, in all rooms.
    pub async fn sweep_expired(&self, horizon: Duration) -> ChatResult<u64> {
        self.sweep_expired_at(db::now_millis(), horizon).await
    }

    pub(crate) async fn sweep_expired_at(&self, now: OffsetDateTime, horizon: Duration) -> ChatResult<u64> {
        let cutoff = db::to_millis(now) - horizon.as_millis() as i64;
        let result = sqlx::query("DELETE FROM messages WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.db_pool)
            .await?;
        Ok(result.rows_affected())
    }
}
