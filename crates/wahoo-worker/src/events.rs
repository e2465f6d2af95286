use wahoo_core::{ChatData, ContactData, MessageData};

/// Data event from the live session, tagged with the connection it came from.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub epoch: u64,
    pub payload: InboundPayload,
}

#[derive(Debug, Clone)]
pub enum InboundPayload {
    Contacts(Vec<ContactData>),
    Chats(Vec<ChatData>),
    Messages(Vec<MessageData>),
    HistorySyncComplete { messages_count: usize },
}
