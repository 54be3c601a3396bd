//! Room-scoped, append-only message history behind an injected store, so the
//! chat core runs against sqlite in the app and against memory in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub sent_at: String,
}

impl ChatMessage {
    /// Stamps a new message with the current time. The v7 id doubles as the
    /// chronological sort key.
    pub fn new(room_id: &str, sender_id: &str, sender_name: &str, text: &str) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            room_id: room_id.to_owned(),
            sender_id: sender_id.to_owned(),
            sender_name: sender_name.to_owned(),
            text: text.to_owned(),
            sent_at: now_rfc3339(),
        }
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

/// Append-only history. Only the chat resolver writes through this; nothing
/// ever mutates or deletes an appended message.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, message: &ChatMessage) -> anyhow::Result<()>;
    /// History of one room, chronological.
    async fn history(&self, room_id: &str) -> anyhow::Result<Vec<ChatMessage>>;
}

pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append(&self, message: &ChatMessage) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO messages (id,room_id,sender_id,sender_name,content,sent_at) \
             VALUES (?,?,?,?,?,?)",
        )
        .bind(&message.id)
        .bind(&message.room_id)
        .bind(&message.sender_id)
        .bind(&message.sender_name)
        .bind(&message.text)
        .bind(&message.sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn history(&self, room_id: &str) -> anyhow::Result<Vec<ChatMessage>> {
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT id,sender_id,sender_name,content,sent_at FROM messages \
             WHERE room_id=? ORDER BY id",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, sender_id, sender_name, text, sent_at)| ChatMessage {
                id,
                room_id: room_id.to_owned(),
                sender_id,
                sender_name,
                text,
                sent_at,
            })
            .collect())
    }
}

/// Per-room lists under one lock; enough for tests and single-process use.
#[derive(Default)]
pub struct MemoryMessageStore {
    rooms: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(&self, message: &ChatMessage) -> anyhow::Result<()> {
        self.rooms
            .lock()
            .await
            .entry(message.room_id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn history(&self, room_id: &str) -> anyhow::Result<Vec<ChatMessage>> {
        Ok(self
            .rooms
            .lock()
            .await
            .get(room_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn check_append_then_history(store: &dyn MessageStore) {
        for (room, text) in [("r1", "first"), ("r1", "second"), ("r2", "elsewhere")] {
            store
                .append(&ChatMessage::new(room, "u1", "Alice", text))
                .await
                .unwrap();
        }

        let history = store.history("r1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "first");
        assert_eq!(history[1].text, "second");
        assert_eq!(history[0].sender_name, "Alice");

        assert_eq!(store.history("r2").await.unwrap().len(), 1);
        assert!(store.history("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        check_append_then_history(&MemoryMessageStore::default()).await;
    }

    #[tokio::test]
    async fn sqlite_store_round_trip() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!().run(&pool).await.unwrap();
        check_append_then_history(&SqliteMessageStore::new(pool)).await;
    }

    #[test]
    fn messages_are_stamped() {
        let message = ChatMessage::new("r1", "u1", "Alice", "hello");
        assert_eq!(message.room_id, "r1");
        assert!(!message.id.is_empty());
        assert!(message.sent_at.contains('T'));
    }
}
