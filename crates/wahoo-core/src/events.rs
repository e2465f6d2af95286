use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BridgeCommand {
    Start { store_dir: String },
    SendMessage { to: String, content: String },
    Shutdown,
}

impl BridgeCommand {
    pub fn name(&self) -> &'static str {
        match self {
            BridgeCommand::Start { .. } => "Start",
            BridgeCommand::SendMessage { .. } => "SendMessage",
            BridgeCommand::Shutdown => "Shutdown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BridgeEvent {
    Ready,
    QrCode { qr: String },
    Connected { phone_number: Option<String> },
    Disconnected { reason: String },
    LoggedOut,

    ContactsUpsert { contacts: Vec<ContactData> },
    ChatsUpsert { chats: Vec<ChatData> },
    MessagesUpsert { messages: Vec<MessageData> },

    HistorySyncComplete { messages_count: usize },

    Error { error: String },

    CommandResult {
        command_id: String,
        success: bool,
        data: Option<serde_json::Value>,
        error: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactData {
    pub jid: String,
    pub name: Option<String>,
    pub notify: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatData {
    pub jid: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageData {
    #[serde(default)]
    pub message_id: Option<String>,
    pub chat_jid: String,
    pub sender_jid: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub is_from_me: bool,
}
