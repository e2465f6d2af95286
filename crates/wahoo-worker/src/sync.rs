use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wahoo_core::{ChatData, ContactData, MessageData};
use wahoo_db::{NewMessage, Store, UpsertOutcome};

use crate::error::{Result, WorkerError};
use crate::events::{InboundEvent, InboundPayload};

/// How far the bridge got with the current connection's events.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncCursor {
    pub epoch: u64,
    pub applied: u64,
}

/// Applies session events to the store. The only writer of synced data.
pub struct SyncBridge {
    store: Store,
    cursor: SyncCursor,
}

impl SyncBridge {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            cursor: SyncCursor::default(),
        }
    }

    pub fn cursor(&self) -> SyncCursor {
        self.cursor
    }

    pub async fn run(mut self, mut events: mpsc::Receiver<InboundEvent>, cancel: CancellationToken) {
        info!("Sync bridge started");

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Some(event) => self.apply(event).await,
                None => break,
            }
        }

        info!(
            epoch = self.cursor.epoch,
            applied = self.cursor.applied,
            "Sync bridge stopped"
        );
    }

    /// Apply one event. Items that cannot be stored are logged and skipped.
    pub async fn apply(&mut self, event: InboundEvent) {
        if event.epoch > self.cursor.epoch {
            if self.cursor.epoch != 0 {
                info!(epoch = event.epoch, "New session, resetting sync cursor");
            }
            self.cursor = SyncCursor {
                epoch: event.epoch,
                applied: 0,
            };
        }

        match event.payload {
            InboundPayload::Messages(messages) => self.apply_messages(messages).await,
            InboundPayload::Contacts(contacts) => self.apply_contacts(contacts).await,
            InboundPayload::Chats(chats) => self.apply_chats(chats).await,
            InboundPayload::HistorySyncComplete { messages_count } => {
                info!(messages_count, "History sync complete");
            }
        }

        self.cursor.applied += 1;
    }

    async fn apply_messages(&self, messages: Vec<MessageData>) {
        let total = messages.len();
        let mut inserted = 0usize;
        let mut duplicates = 0usize;

        for data in messages {
            let direction = if data.is_from_me { "->" } else { "<-" };
            debug!("  {} {}", direction, data.chat_jid);

            match self.store_message(data).await {
                Ok(UpsertOutcome::Inserted) => inserted += 1,
                Ok(UpsertOutcome::Duplicate) => duplicates += 1,
                Err(e) => warn!(error = %e, "Skipping message"),
            }
        }

        info!(total, inserted, duplicates, "Messages synced");
    }

    async fn store_message(&self, data: MessageData) -> Result<UpsertOutcome> {
        let message = to_new_message(data)?;
        Ok(self.store.upsert_message(&message).await?)
    }

    async fn apply_contacts(&self, contacts: Vec<ContactData>) {
        let count = contacts.len();

        for contact in contacts {
            if contact.jid.trim().is_empty() {
                debug!("Skipping contact without jid");
                continue;
            }
            if let Err(e) = self
                .store
                .upsert_contact(
                    &contact.jid,
                    contact.name.as_deref(),
                    contact.notify.as_deref(),
                    contact.phone_number.as_deref(),
                )
                .await
            {
                warn!(jid = %contact.jid, error = %e, "Skipping contact");
            }
        }

        info!(count, "Contacts synced");
    }

    async fn apply_chats(&self, chats: Vec<ChatData>) {
        let count = chats.len();

        for chat in chats {
            if chat.jid.trim().is_empty() {
                debug!("Skipping chat without jid");
                continue;
            }
            if let Err(e) = self.store.upsert_chat(&chat.jid, chat.name.as_deref()).await {
                warn!(jid = %chat.jid, error = %e, "Skipping chat");
            }
        }

        info!(count, "Chats synced");
    }
}

fn to_new_message(data: MessageData) -> Result<NewMessage> {
    if data.chat_jid.trim().is_empty() {
        return Err(WorkerError::Unmappable("message without chat".to_string()));
    }
    if data.sender_jid.trim().is_empty() {
        return Err(WorkerError::Unmappable(format!(
            "message in {} without sender",
            data.chat_jid
        )));
    }

    let timestamp = if data.timestamp > 0 {
        data.timestamp
    } else {
        Utc::now().timestamp()
    };

    Ok(NewMessage {
        message_id: data.message_id,
        chat_jid: data.chat_jid,
        sender: data.sender_jid,
        content: data.content.unwrap_or_default(),
        timestamp,
        reported_timestamp: data.timestamp.max(0),
        is_from_me: data.is_from_me,
        media_type: data.media_type,
    })
}

#[cfg(test)]
mod tests {
    use wahoo_db::{ListChatsOpts, ListMessagesOpts};

    use super::*;

    async fn test_store() -> Store {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        store
    }

    fn message(chat: &str, id: &str, ts: i64, content: &str) -> MessageData {
        MessageData {
            message_id: Some(id.to_string()),
            chat_jid: chat.to_string(),
            sender_jid: chat.to_string(),
            content: Some(content.to_string()),
            media_type: None,
            timestamp: ts,
            is_from_me: false,
        }
    }

    fn event(epoch: u64, payload: InboundPayload) -> InboundEvent {
        InboundEvent { epoch, payload }
    }

    #[tokio::test]
    async fn test_messages_are_stored_once() {
        let store = test_store().await;
        let mut bridge = SyncBridge::new(store.clone());
        let chat = "5511999999999@s.whatsapp.net";

        let batch = vec![message(chat, "A", 100, "hi"), message(chat, "B", 200, "there")];
        bridge.apply(event(1, InboundPayload::Messages(batch.clone()))).await;
        // history replay delivers the same messages again
        bridge.apply(event(1, InboundPayload::Messages(batch))).await;

        let stored = store.list_messages(&ListMessagesOpts::new(chat)).await.unwrap();
        assert_eq!(stored.len(), 2);
        let chats = store.list_chats(&ListChatsOpts::default()).await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].last_message.as_ref().unwrap().content, "there");
        assert_eq!(bridge.cursor(), SyncCursor { epoch: 1, applied: 2 });
    }

    #[tokio::test]
    async fn test_bad_messages_do_not_block_batch() {
        let store = test_store().await;
        let mut bridge = SyncBridge::new(store.clone());
        let chat = "5511999999999@s.whatsapp.net";

        let mut no_sender = message(chat, "X", 100, "lost");
        no_sender.sender_jid = String::new();
        let no_chat = message("", "Y", 100, "lost");

        bridge
            .apply(event(
                1,
                InboundPayload::Messages(vec![no_sender, no_chat, message(chat, "A", 100, "kept")]),
            ))
            .await;

        let messages = store.list_messages(&ListMessagesOpts::new(chat)).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "kept");
    }

    #[tokio::test]
    async fn test_missing_timestamp_uses_ingestion_time() {
        let store = test_store().await;
        let mut bridge = SyncBridge::new(store.clone());
        let chat = "5511999999999@s.whatsapp.net";
        let before = Utc::now().timestamp();

        bridge
            .apply(event(1, InboundPayload::Messages(vec![message(chat, "A", 0, "now")])))
            .await;

        let messages = store.list_messages(&ListMessagesOpts::new(chat)).await.unwrap();
        assert!(messages[0].timestamp >= before);
    }

    #[tokio::test]
    async fn test_replayed_message_without_id_or_timestamp_is_stored_once() {
        let store = test_store().await;
        let mut bridge = SyncBridge::new(store.clone());
        let chat = "5511999999999@s.whatsapp.net";

        let mut bare = message(chat, "", 0, "sem hora");
        bare.message_id = None;

        bridge
            .apply(event(1, InboundPayload::Messages(vec![bare.clone()])))
            .await;
        // ingestion time moves on before the replay arrives
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        bridge
            .apply(event(1, InboundPayload::Messages(vec![bare])))
            .await;

        let stored = store.list_messages(&ListMessagesOpts::new(chat)).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "sem hora");
    }

    #[tokio::test]
    async fn test_contacts_and_chats_name_the_chat() {
        let store = test_store().await;
        let mut bridge = SyncBridge::new(store.clone());
        let chat = "5511999999999@s.whatsapp.net";
        let group = "120363000000000000@g.us";

        bridge
            .apply(event(
                1,
                InboundPayload::Contacts(vec![ContactData {
                    jid: chat.to_string(),
                    name: None,
                    notify: Some("Maria".to_string()),
                    phone_number: Some("5511999999999".to_string()),
                }]),
            ))
            .await;
        bridge
            .apply(event(
                1,
                InboundPayload::Chats(vec![
                    ChatData {
                        jid: group.to_string(),
                        name: Some("Family".to_string()),
                    },
                    ChatData {
                        jid: String::new(),
                        name: None,
                    },
                ]),
            ))
            .await;
        bridge
            .apply(event(1, InboundPayload::Messages(vec![message(chat, "A", 100, "oi")])))
            .await;

        let chats = store.list_chats(&ListChatsOpts::default()).await.unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].jid, chat);
        assert_eq!(chats[0].name, "Maria");
        assert_eq!(chats[1].name, "Family");
        assert!(chats[1].is_group);
    }

    #[tokio::test]
    async fn test_cursor_resets_on_new_epoch() {
        let store = test_store().await;
        let mut bridge = SyncBridge::new(store);

        bridge
            .apply(event(1, InboundPayload::HistorySyncComplete { messages_count: 0 }))
            .await;
        bridge
            .apply(event(1, InboundPayload::HistorySyncComplete { messages_count: 0 }))
            .await;
        assert_eq!(bridge.cursor(), SyncCursor { epoch: 1, applied: 2 });

        bridge
            .apply(event(2, InboundPayload::HistorySyncComplete { messages_count: 0 }))
            .await;
        assert_eq!(bridge.cursor(), SyncCursor { epoch: 2, applied: 1 });

        // a late event from the old connection does not rewind the cursor
        bridge
            .apply(event(1, InboundPayload::HistorySyncComplete { messages_count: 0 }))
            .await;
        assert_eq!(bridge.cursor(), SyncCursor { epoch: 2, applied: 2 });
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let store = test_store().await;
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(SyncBridge::new(store.clone()).run(rx, cancel.clone()));

        let chat = "5511999999999@s.whatsapp.net";
        tx.send(event(1, InboundPayload::Messages(vec![message(chat, "A", 100, "hi")])))
            .await
            .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while store
                .list_messages(&ListMessagesOpts::new(chat))
                .await
                .unwrap()
                .is_empty()
            {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
