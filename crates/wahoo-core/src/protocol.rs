use serde::{Deserialize, Serialize};

use crate::events::{BridgeCommand, BridgeEvent};

/// One line of the bridge's newline-delimited JSON stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeMessage {
    pub id: String,
    #[serde(flatten)]
    pub content: BridgeMessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BridgeMessageContent {
    Command(BridgeCommand),
    Event(BridgeEvent),
}

impl BridgeMessage {
    pub fn new_command(command: BridgeCommand) -> Self {
        Self {
            id: generate_id(),
            content: BridgeMessageContent::Command(command),
        }
    }

    pub fn to_line(&self) -> serde_json::Result<String> {
        Ok(serde_json::to_string(self)? + "\n")
    }

    pub fn from_line(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }

    pub fn into_event(self) -> Option<BridgeEvent> {
        match self.content {
            BridgeMessageContent::Event(event) => Some(event),
            BridgeMessageContent::Command(_) => None,
        }
    }
}

fn generate_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    // nanos alone collide when two commands are framed back to back
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", nanos, seq)
}
