//! `SQLite`-backed conversation and message store.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::chat::core::errors::{ChatError, ChatResult};
use crate::chat::core::ids::ConversationId;
use crate::chat::core::records::{Conversation, Message, Sender};

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Conversation header table.
const CONVERSATION_TABLE: &str = "conversation_list";
/// Message table.
const MESSAGE_TABLE: &str = "conversation_history";

/// Durable storage for conversations and their messages.
pub trait ChatStore: Send + Sync {
    /// Create a conversation with an optional title.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn create_conversation(
        &self,
        title: Option<String>,
    ) -> StoreFuture<'_, ChatResult<Conversation>>;

    /// List conversations, newest creation time first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list_conversations(&self) -> StoreFuture<'_, ChatResult<Vec<Conversation>>>;

    /// Fetch one conversation.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get_conversation(
        &self,
        id: ConversationId,
    ) -> StoreFuture<'_, ChatResult<Option<Conversation>>>;

    /// Delete a conversation and all of its messages.
    ///
    /// Returns `true` if a conversation row was removed.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn delete_conversation(&self, id: ConversationId) -> StoreFuture<'_, ChatResult<bool>>;

    /// Append a message, assigning its id and timestamp.
    ///
    /// # Errors
    /// Returns an error if storage access fails or the conversation does not exist.
    fn append_message(
        &self,
        conversation_id: ConversationId,
        sender: Sender,
        content: String,
    ) -> StoreFuture<'_, ChatResult<Message>>;

    /// List the messages of a conversation, oldest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> StoreFuture<'_, ChatResult<Vec<Message>>>;
}

/// `SQLite` implementation of [`ChatStore`].
pub struct SqliteChatStore {
    conn: Connection,
}

impl SqliteChatStore {
    /// Open (or create) the database file and ensure the schema exists.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> ChatResult<Self> {
        let conn = Connection::open(path.as_ref()).await?;
        Self::init(conn).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be created.
    pub async fn open_in_memory() -> ChatResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> ChatResult<Self> {
        conn.call(|conn| {
            conn.execute_batch(&format!(
                "PRAGMA foreign_keys = ON;
                CREATE TABLE IF NOT EXISTS {CONVERSATION_TABLE} (
                    conversation_id TEXT PRIMARY KEY,
                    conversation_create_time INTEGER NOT NULL,
                    conversation_title TEXT
                );
                CREATE TABLE IF NOT EXISTS {MESSAGE_TABLE} (
                    record_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    conversation_id TEXT NOT NULL
                        REFERENCES {CONVERSATION_TABLE} (conversation_id),
                    message_sender TEXT NOT NULL CHECK (message_sender IN ('user', 'agent')),
                    message_content TEXT NOT NULL,
                    message_send_time INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{MESSAGE_TABLE}_conversation_time
                    ON {MESSAGE_TABLE} (conversation_id, message_send_time);"
            ))?;
            Ok(())
        })
        .await?;

        tracing::debug!("chat store schema ready");
        Ok(Self { conn })
    }
}

impl ChatStore for SqliteChatStore {
    fn create_conversation(
        &self,
        title: Option<String>,
    ) -> StoreFuture<'_, ChatResult<Conversation>> {
        Box::pin(async move {
            let id = ConversationId::new();
            let now_ms = Utc::now().timestamp_millis();
            let created_at = timestamp_from_millis(now_ms)?;
            let stored_title = title.clone();

            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO {CONVERSATION_TABLE}
                                (conversation_id, conversation_create_time, conversation_title)
                             VALUES (?1, ?2, ?3)"
                        ),
                        rusqlite::params![id, now_ms, stored_title],
                    )?;
                    Ok(())
                })
                .await?;

            Ok(Conversation {
                id,
                created_at,
                title,
            })
        })
    }

    fn list_conversations(&self) -> StoreFuture<'_, ChatResult<Vec<Conversation>>> {
        Box::pin(async move {
            let rows = self
                .conn
                .call(|conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT conversation_id, conversation_create_time, conversation_title
                         FROM {CONVERSATION_TABLE}
                         ORDER BY conversation_create_time DESC, rowid DESC"
                    ))?;
                    let rows = stmt
                        .query_map([], |row| {
                            let id: ConversationId = row.get(0)?;
                            let created_ms: i64 = row.get(1)?;
                            let title: Option<String> = row.get(2)?;
                            Ok((id, created_ms, title))
                        })?
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(rows)
                })
                .await?;

            rows.into_iter()
                .map(|(id, created_ms, title)| conversation_from_row(id, created_ms, title))
                .collect()
        })
    }

    fn get_conversation(
        &self,
        id: ConversationId,
    ) -> StoreFuture<'_, ChatResult<Option<Conversation>>> {
        Box::pin(async move {
            let row = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            &format!(
                                "SELECT conversation_create_time, conversation_title
                                 FROM {CONVERSATION_TABLE}
                                 WHERE conversation_id = ?1"
                            ),
                            rusqlite::params![id],
                            |row| {
                                let created_ms: i64 = row.get(0)?;
                                let title: Option<String> = row.get(1)?;
                                Ok((created_ms, title))
                            },
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;

            row.map(|(created_ms, title)| conversation_from_row(id, created_ms, title))
                .transpose()
        })
    }

    fn delete_conversation(&self, id: ConversationId) -> StoreFuture<'_, ChatResult<bool>> {
        Box::pin(async move {
            let removed = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    tx.execute(
                        &format!("DELETE FROM {MESSAGE_TABLE} WHERE conversation_id = ?1"),
                        rusqlite::params![id],
                    )?;
                    let removed = tx.execute(
                        &format!("DELETE FROM {CONVERSATION_TABLE} WHERE conversation_id = ?1"),
                        rusqlite::params![id],
                    )?;
                    tx.commit()?;
                    Ok(removed > 0)
                })
                .await?;
            Ok(removed)
        })
    }

    fn append_message(
        &self,
        conversation_id: ConversationId,
        sender: Sender,
        content: String,
    ) -> StoreFuture<'_, ChatResult<Message>> {
        Box::pin(async move {
            let now_ms = Utc::now().timestamp_millis();
            let sent_at = timestamp_from_millis(now_ms)?;
            let stored_content = content.clone();

            let id = self
                .conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO {MESSAGE_TABLE}
                                (conversation_id, message_sender, message_content, message_send_time)
                             VALUES (?1, ?2, ?3, ?4)"
                        ),
                        rusqlite::params![conversation_id, sender.as_str(), stored_content, now_ms],
                    )?;
                    Ok(conn.last_insert_rowid())
                })
                .await?;

            Ok(Message {
                id,
                conversation_id,
                sender,
                content,
                sent_at,
            })
        })
    }

    fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> StoreFuture<'_, ChatResult<Vec<Message>>> {
        Box::pin(async move {
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT record_id, message_sender, message_content, message_send_time
                         FROM {MESSAGE_TABLE}
                         WHERE conversation_id = ?1
                         ORDER BY message_send_time ASC, record_id ASC"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params![conversation_id], |row| {
                            let id: i64 = row.get(0)?;
                            let sender: String = row.get(1)?;
                            let content: String = row.get(2)?;
                            let sent_ms: i64 = row.get(3)?;
                            Ok((id, sender, content, sent_ms))
                        })?
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(rows)
                })
                .await?;

            rows.into_iter()
                .map(|(id, sender, content, sent_ms)| {
                    Ok(Message {
                        id,
                        conversation_id,
                        sender: sender.parse()?,
                        content,
                        sent_at: timestamp_from_millis(sent_ms)?,
                    })
                })
                .collect()
        })
    }
}

fn conversation_from_row(
    id: ConversationId,
    created_ms: i64,
    title: Option<String>,
) -> ChatResult<Conversation> {
    Ok(Conversation {
        id,
        created_at: timestamp_from_millis(created_ms)?,
        title,
    })
}

fn timestamp_from_millis(ms: i64) -> ChatResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| ChatError::InvalidRecord(format!("invalid timestamp: {ms}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteChatStore {
        SqliteChatStore::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_then_list_newest_first() {
        let store = store().await;
        let first = store.create_conversation(Some("first".to_string())).await.unwrap();
        let second = store.create_conversation(None).await.unwrap();
        let third = store.create_conversation(Some("third".to_string())).await.unwrap();

        let listed = store.list_conversations().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
        assert!(listed.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[tokio::test]
    async fn test_get_conversation_roundtrips_fields() {
        let store = store().await;
        let created = store.create_conversation(Some("hello".to_string())).await.unwrap();

        let fetched = store.get_conversation(created.id).await.unwrap();
        assert_eq!(fetched, Some(created));

        let missing = store.get_conversation(ConversationId::new()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_messages_come_back_in_send_order() {
        let store = store().await;
        let conversation = store.create_conversation(None).await.unwrap();

        for i in 0..5 {
            let sender = if i % 2 == 0 { Sender::User } else { Sender::Agent };
            store
                .append_message(conversation.id, sender, format!("message {i}"))
                .await
                .unwrap();
        }

        let history = store.list_messages(conversation.id).await.unwrap();
        assert_eq!(history.len(), 5);
        assert!(history.windows(2).all(|w| w[0].sent_at <= w[1].sent_at));
        assert!(history.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(history[0].content, "message 0");
        assert_eq!(history[1].sender, Sender::Agent);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_messages() {
        let store = store().await;
        let doomed = store.create_conversation(None).await.unwrap();
        let kept = store.create_conversation(None).await.unwrap();
        store
            .append_message(doomed.id, Sender::User, "bye".to_string())
            .await
            .unwrap();
        store
            .append_message(kept.id, Sender::User, "stay".to_string())
            .await
            .unwrap();

        assert!(store.delete_conversation(doomed.id).await.unwrap());

        let listed = store.list_conversations().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, kept.id);
        assert!(store.list_messages(doomed.id).await.unwrap().is_empty());
        assert_eq!(store.list_messages(kept.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_conversation_is_noop() {
        let store = store().await;
        assert!(!store.delete_conversation(ConversationId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_append_to_unknown_conversation_fails() {
        let store = store().await;
        let result = store
            .append_message(ConversationId::new(), Sender::User, "orphan".to_string())
            .await;
        assert!(result.is_err());
    }
}
