use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub timestamp: i64,
    pub sender: String,
    pub is_from_me: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub jid: String,
    /// Chat name, contact name or the JID itself.
    pub name: String,
    pub is_group: bool,
    pub last_message: Option<LastMessage>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ChatRow {
    pub jid: String,
    pub name: String,
    pub is_group: bool,
    pub last_message_content: Option<String>,
    pub last_message_time: Option<i64>,
    pub last_message_sender: Option<String>,
    pub last_message_from_me: Option<bool>,
}

impl ChatRow {
    pub(crate) fn into_chat(self, include_last_message: bool) -> Chat {
        let last_message = match (include_last_message, self.last_message_time) {
            (true, Some(timestamp)) => Some(LastMessage {
                content: self.last_message_content.unwrap_or_default(),
                timestamp,
                sender: self.last_message_sender.unwrap_or_default(),
                is_from_me: self.last_message_from_me.unwrap_or(false),
            }),
            _ => None,
        };

        Chat {
            jid: self.jid,
            name: self.name,
            is_group: self.is_group,
            last_message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    /// Message id assigned by the network, when the session supplied one.
    pub id: Option<String>,
    pub chat_jid: String,
    pub sender: String,
    pub content: String,
    pub timestamp: i64,
    pub is_from_me: bool,
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub chat_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sender_name: Option<String>,
}

/// A message as handed to [`Store::upsert_message`](crate::Store::upsert_message).
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub message_id: Option<String>,
    pub chat_jid: String,
    pub sender: String,
    pub content: String,
    pub timestamp: i64,
    /// Timestamp as the session reported it, 0 when it had none.
    pub reported_timestamp: i64,
    pub is_from_me: bool,
    pub media_type: Option<String>,
}

impl NewMessage {
    /// Stable identity used for idempotent upserts.
    pub fn identity_key(&self) -> String {
        match self.message_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => format!("id:{}:{}", self.chat_jid, id),
            None if self.reported_timestamp > 0 => format!(
                "ts:{}:{}:{}",
                self.chat_jid, self.reported_timestamp, self.sender
            ),
            // no time to go on, so the text stands in for it
            None => format!("ts:{}:0:{}:{}", self.chat_jid, self.sender, self.content),
        }
    }

    pub(crate) fn preview_content(&self) -> String {
        match (&self.media_type, self.content.is_empty()) {
            (Some(media), true) => format!("[{}]", media),
            _ => self.content.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contact {
    pub jid: String,
    pub name: String,
    pub phone_number: Option<String>,
}
