use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use wahoo_core::jid;

use crate::error::{DbError, Result};
use crate::models::{Chat, ChatRow, Contact, Message, NewMessage};
use crate::options::{CONTACT_SEARCH_LIMIT, ChatSort, ListChatsOpts, ListMessagesOpts, clamp_limit};
use crate::schema::SCHEMA;

pub const DB_FILE_NAME: &str = "wahoo.db";

const READER_CONNECTIONS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// The identity key was already stored; nothing changed.
    Duplicate,
}

/// SQLite mirror of the account's chats, messages and contacts.
///
/// Writes go through a single-connection pool so they serialize among
/// themselves; reads use a separate read-only pool. With WAL journaling every
/// read statement sees a committed snapshot, so a message row and the chat
/// preview it advanced always become visible together.
#[derive(Clone)]
pub struct Store {
    reader: SqlitePool,
    writer: SqlitePool,
}

impl Store {
    /// Open (or create) `wahoo.db` inside `store_dir`.
    pub async fn open(store_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(store_dir)?;

        let db_path = store_dir.join(DB_FILE_NAME);
        let store = Self::open_path(&db_path).await?;

        tracing::info!("Database initialized at: {}", db_path.display());

        Ok(store)
    }

    pub async fn open_path(db_path: &Path) -> Result<Self> {
        let base_opts = SqliteConnectOptions::new()
            .filename(db_path)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(base_opts.clone())
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(READER_CONNECTIONS)
            .connect_with(base_opts.read_only(true))
            .await?;

        Ok(Self { reader, writer })
    }

    pub async fn close(&self) {
        self.reader.close().await;
        self.writer.close().await;
    }

    /// Insert a message unless its identity key is already stored.
    ///
    /// The owning chat row is created on demand, and its preview is advanced
    /// in the same transaction when the new message is at least as recent as
    /// the current preview.
    pub async fn upsert_message(&self, msg: &NewMessage) -> Result<UpsertOutcome> {
        if msg.chat_jid.is_empty() {
            return Err(DbError::InvalidMessage("empty chat_jid".into()));
        }
        if msg.sender.is_empty() {
            return Err(DbError::InvalidMessage("empty sender".into()));
        }

        let now = Utc::now().timestamp();
        let key = msg.identity_key();

        let mut tx = self.writer.begin().await?;

        sqlx::query(
            "INSERT INTO chats (jid, is_group, created_at, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(jid) DO NOTHING",
        )
        .bind(&msg.chat_jid)
        .bind(jid::is_group(&msg.chat_jid))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            r#"INSERT INTO messages
               (message_key, message_id, chat_jid, sender, content, media_type, timestamp, is_from_me, ingested_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(message_key) DO NOTHING"#,
        )
        .bind(&key)
        .bind(msg.message_id.as_deref())
        .bind(&msg.chat_jid)
        .bind(&msg.sender)
        .bind(&msg.content)
        .bind(msg.media_type.as_deref())
        .bind(msg.timestamp)
        .bind(msg.is_from_me)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !inserted {
            tx.rollback().await?;
            return Ok(UpsertOutcome::Duplicate);
        }

        // `<=` so that equal timestamps resolve to the later ingestion
        sqlx::query(
            r#"UPDATE chats SET
                 last_message_content = ?,
                 last_message_time = ?,
                 last_message_sender = ?,
                 last_message_from_me = ?,
                 updated_at = ?
               WHERE jid = ? AND (last_message_time IS NULL OR last_message_time <= ?)"#,
        )
        .bind(msg.preview_content())
        .bind(msg.timestamp)
        .bind(&msg.sender)
        .bind(msg.is_from_me)
        .bind(now)
        .bind(&msg.chat_jid)
        .bind(msg.timestamp)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(UpsertOutcome::Inserted)
    }

    pub async fn upsert_chat(&self, chat_jid: &str, name: Option<&str>) -> Result<()> {
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"INSERT INTO chats (jid, name, is_group, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(jid) DO UPDATE SET
                 name = COALESCE(excluded.name, name),
                 updated_at = excluded.updated_at"#,
        )
        .bind(chat_jid)
        .bind(name)
        .bind(jid::is_group(chat_jid))
        .bind(now)
        .bind(now)
        .execute(&self.writer)
        .await?;

        Ok(())
    }

    pub async fn upsert_contact(
        &self,
        jid: &str,
        name: Option<&str>,
        notify_name: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"INSERT INTO contacts (jid, name, notify_name, phone_number, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(jid) DO UPDATE SET
                 name = COALESCE(excluded.name, name),
                 notify_name = COALESCE(excluded.notify_name, notify_name),
                 phone_number = COALESCE(excluded.phone_number, phone_number),
                 updated_at = excluded.updated_at"#,
        )
        .bind(jid)
        .bind(name)
        .bind(notify_name)
        .bind(phone_number)
        .bind(now)
        .bind(now)
        .execute(&self.writer)
        .await?;

        Ok(())
    }

    pub async fn list_chats(&self, opts: &ListChatsOpts) -> Result<Vec<Chat>> {
        let order_by = match opts.sort_by {
            ChatSort::LastActive => {
                "c.last_message_time IS NULL, c.last_message_time DESC, c.jid ASC"
            }
            ChatSort::Name => "name COLLATE NOCASE ASC, c.jid ASC",
        };

        let sql = format!(
            r#"SELECT c.jid,
                      COALESCE(c.name, ct.name, ct.notify_name, c.jid) AS name,
                      c.is_group,
                      c.last_message_content,
                      c.last_message_time,
                      c.last_message_sender,
                      c.last_message_from_me
               FROM chats c
               LEFT JOIN contacts ct ON ct.jid = c.jid
               ORDER BY {}
               LIMIT ?"#,
            order_by
        );

        let rows = sqlx::query_as::<_, ChatRow>(&sql)
            .bind(clamp_limit(opts.limit))
            .fetch_all(&self.reader)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_chat(opts.include_last_message))
            .collect())
    }

    #[cfg(test)]
    pub(crate) async fn get_chat(&self, chat_jid: &str) -> Result<Option<Chat>> {
        let row = sqlx::query_as::<_, ChatRow>(
            r#"SELECT c.jid,
                      COALESCE(c.name, ct.name, ct.notify_name, c.jid) AS name,
                      c.is_group,
                      c.last_message_content,
                      c.last_message_time,
                      c.last_message_sender,
                      c.last_message_from_me
               FROM chats c
               LEFT JOIN contacts ct ON ct.jid = c.jid
               WHERE c.jid = ?"#,
        )
        .bind(chat_jid)
        .fetch_optional(&self.reader)
        .await?;

        Ok(row.map(|row| row.into_chat(true)))
    }

    /// Newest first; equal timestamps come back in reverse ingestion order.
    pub async fn list_messages(&self, opts: &ListMessagesOpts) -> Result<Vec<Message>> {
        let mut messages = sqlx::query_as::<_, Message>(
            r#"SELECT m.message_id AS id,
                      m.chat_jid,
                      m.sender,
                      m.content,
                      m.timestamp,
                      m.is_from_me,
                      m.media_type,
                      COALESCE(c.name, cc.name, cc.notify_name, m.chat_jid) AS chat_name,
                      COALESCE(sc.name, sc.notify_name) AS sender_name
               FROM messages m
               LEFT JOIN chats c ON c.jid = m.chat_jid
               LEFT JOIN contacts cc ON cc.jid = m.chat_jid
               LEFT JOIN contacts sc ON sc.jid = m.sender
               WHERE m.chat_jid = ?
               ORDER BY m.timestamp DESC, m.seq DESC
               LIMIT ?"#,
        )
        .bind(&opts.chat_jid)
        .bind(clamp_limit(opts.limit))
        .fetch_all(&self.reader)
        .await?;

        if !opts.include_context {
            for msg in &mut messages {
                msg.chat_name = None;
                msg.sender_name = None;
            }
        }

        Ok(messages)
    }

    #[cfg(test)]
    pub(crate) async fn count_messages(&self, chat_jid: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE chat_jid = ?")
            .bind(chat_jid)
            .fetch_one(&self.reader)
            .await?;
        Ok(count)
    }

    /// Case-insensitive substring match on name, notify name or JID.
    pub async fn search_contacts(&self, query: &str) -> Result<Vec<Contact>> {
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));

        Ok(sqlx::query_as::<_, Contact>(
            r#"SELECT jid,
                      COALESCE(name, notify_name, phone_number, jid) AS name,
                      phone_number
               FROM contacts
               WHERE lower(jid) LIKE ? ESCAPE '\'
                  OR lower(COALESCE(name, '')) LIKE ? ESCAPE '\'
                  OR lower(COALESCE(notify_name, '')) LIKE ? ESCAPE '\'
               ORDER BY name COLLATE NOCASE ASC, jid ASC
               LIMIT ?"#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(CONTACT_SEARCH_LIMIT)
        .fetch_all(&self.reader)
        .await?)
    }
}

fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
