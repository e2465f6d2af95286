use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wahoo_core::{BridgeEvent, jid};
use wahoo_ipc::SessionTransport;

use crate::events::{InboundEvent, InboundPayload};
use crate::state::{SendOutcome, SessionState};

pub const NOT_CONNECTED: &str = "WhatsApp not connected";

const INBOUND_CHANNEL_CAPACITY: usize = 1000;

/// Bookkeeping for the current connection attempt. Every state change goes
/// through this lock, and events from an attempt whose epoch is no longer
/// current are ignored.
#[derive(Default)]
struct Lifecycle {
    epoch: u64,
    cancel: Option<CancellationToken>,
}

/// Owns the single live session with the messaging network.
pub struct SessionManager<T: SessionTransport> {
    transport: T,
    lifecycle: Mutex<Lifecycle>,
    state_tx: watch::Sender<SessionState>,
    pairing_tx: watch::Sender<Option<String>>,
    send_lock: tokio::sync::Mutex<()>,
    inbound_tx: mpsc::Sender<InboundEvent>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundEvent>>>,
}

impl<T: SessionTransport> SessionManager<T> {
    pub fn new(transport: T) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        let (pairing_tx, _) = watch::channel(None);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

        Self {
            transport,
            lifecycle: Mutex::new(Lifecycle::default()),
            state_tx,
            pairing_tx,
            send_lock: tokio::sync::Mutex::new(()),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
        }
    }

    /// Data events for the sync bridge. Can only be taken once.
    pub fn take_event_receiver(&self) -> Option<mpsc::Receiver<InboundEvent>> {
        lock(&self.inbound_rx).take()
    }

    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state_tx.borrow().is_connected()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Latest pairing code, cleared once the session connects.
    pub fn pairing_codes(&self) -> watch::Receiver<Option<String>> {
        self.pairing_tx.subscribe()
    }

    /// Start a connection attempt. No-op while connecting or connected.
    pub fn connect(self: &Arc<Self>) {
        self.begin_attempt("connect", |state| {
            matches!(state, SessionState::Disconnected | SessionState::Error(_))
        });
    }

    /// Drop the current connection and start over. No-op unless connected or failed.
    pub fn reconnect(self: &Arc<Self>) {
        self.begin_attempt("reconnect", |state| {
            matches!(state, SessionState::Connected | SessionState::Error(_))
        });
    }

    /// Tear down the session. Safe to call any number of times.
    pub async fn disconnect(&self) {
        let was_active = {
            let mut lifecycle = lock(&self.lifecycle);
            lifecycle.epoch += 1;
            if let Some(cancel) = lifecycle.cancel.take() {
                cancel.cancel();
            }
            self.state_tx.send_if_modified(|state| {
                if *state == SessionState::Disconnected {
                    false
                } else {
                    *state = SessionState::Disconnected;
                    true
                }
            })
        };

        if !was_active {
            debug!("Disconnect ignored, session not active");
            return;
        }

        self.pairing_tx.send_replace(None);
        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "Failed to release session transport");
        }
        info!("Session disconnected");
    }

    /// Send a text message. Failures are reported in the outcome, never as errors.
    pub async fn send_message(&self, recipient: &str, text: &str) -> SendOutcome {
        if !self.is_connected() {
            return SendOutcome::failed(NOT_CONNECTED);
        }

        let Some(to) = jid::normalize_recipient(recipient) else {
            return SendOutcome::failed(format!("Invalid recipient: {}", recipient));
        };

        // one outbound message at a time
        let _guard = self.send_lock.lock().await;

        if !self.is_connected() {
            return SendOutcome::failed(NOT_CONNECTED);
        }

        match self.transport.send_text(&to, text).await {
            Ok(receipt) => {
                if !receipt.success {
                    warn!(to = %to, detail = %receipt.detail, "Message rejected");
                }
                SendOutcome {
                    ok: receipt.success,
                    detail: receipt.detail,
                }
            }
            Err(e) => {
                warn!(to = %to, error = %e, "Failed to send message");
                SendOutcome::failed(format!("Failed to send message: {}", e))
            }
        }
    }

    fn begin_attempt(self: &Arc<Self>, action: &str, allowed: fn(&SessionState) -> bool) {
        let (epoch, cancel) = {
            let mut lifecycle = lock(&self.lifecycle);
            let started = self.state_tx.send_if_modified(|state| {
                if allowed(state) {
                    *state = SessionState::Connecting;
                    true
                } else {
                    false
                }
            });
            if !started {
                debug!(action, state = %self.state(), "Ignored, nothing to do");
                return;
            }

            lifecycle.epoch += 1;
            if let Some(old) = lifecycle.cancel.take() {
                old.cancel();
            }
            let cancel = CancellationToken::new();
            lifecycle.cancel = Some(cancel.clone());
            (lifecycle.epoch, cancel)
        };

        info!(epoch, action, "Starting session");
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_connection(epoch, cancel).await });
    }

    async fn run_connection(self: Arc<Self>, epoch: u64, cancel: CancellationToken) {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = self.transport.connect() => result,
        };

        let mut events = match connected {
            Ok(events) => events,
            Err(e) => {
                warn!(epoch, error = %e, "Failed to open session");
                self.fail(epoch, e.to_string());
                return;
            }
        };

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(epoch, "Session pump cancelled");
                    return;
                }
                event = events.recv() => event,
            };

            match event {
                Some(event) => self.handle_event(epoch, &cancel, event).await,
                None => {
                    self.fail(epoch, "session stream closed".to_string());
                    return;
                }
            }
        }
    }

    async fn handle_event(&self, epoch: u64, cancel: &CancellationToken, event: BridgeEvent) {
        match event {
            BridgeEvent::Ready => debug!(epoch, "Session bridge ready"),

            BridgeEvent::QrCode { qr } => {
                if self.is_current(epoch) {
                    info!("Pairing code received, scan it with WhatsApp on your phone");
                    self.pairing_tx.send_replace(Some(qr));
                }
            }

            BridgeEvent::Connected { phone_number } => {
                let changed = self.transition(epoch, |state| {
                    matches!(state, SessionState::Connecting | SessionState::Error(_))
                        .then_some(SessionState::Connected)
                });
                if changed {
                    self.pairing_tx.send_replace(None);
                    info!(
                        phone_number = phone_number.as_deref().unwrap_or("unknown"),
                        "WhatsApp connected"
                    );
                }
            }

            BridgeEvent::Disconnected { reason } => {
                warn!(epoch, reason = %reason, "Session disconnected by remote");
                self.fail(epoch, reason);
            }

            BridgeEvent::LoggedOut => {
                warn!(epoch, "Session logged out, pairing required");
                self.fail(epoch, "logged out".to_string());
            }

            BridgeEvent::Error { error } => warn!(epoch, error = %error, "Session reported an error"),

            BridgeEvent::ContactsUpsert { contacts } => {
                self.forward(epoch, cancel, InboundPayload::Contacts(contacts)).await
            }
            BridgeEvent::ChatsUpsert { chats } => {
                self.forward(epoch, cancel, InboundPayload::Chats(chats)).await
            }
            BridgeEvent::MessagesUpsert { messages } => {
                self.forward(epoch, cancel, InboundPayload::Messages(messages)).await
            }
            BridgeEvent::HistorySyncComplete { messages_count } => {
                self.forward(epoch, cancel, InboundPayload::HistorySyncComplete { messages_count })
                    .await
            }

            BridgeEvent::CommandResult { command_id, .. } => {
                debug!(command_id = %command_id, "Unclaimed command result")
            }
        }
    }

    async fn forward(&self, epoch: u64, cancel: &CancellationToken, payload: InboundPayload) {
        let event = InboundEvent { epoch, payload };
        tokio::select! {
            _ = cancel.cancelled() => {}
            result = self.inbound_tx.send(event) => {
                if result.is_err() {
                    debug!(epoch, "No sync consumer, dropping session event");
                }
            }
        }
    }

    fn fail(&self, epoch: u64, reason: String) {
        self.transition(epoch, |state| {
            (*state != SessionState::Disconnected).then(|| SessionState::Error(reason.clone()))
        });
    }

    fn is_current(&self, epoch: u64) -> bool {
        lock(&self.lifecycle).epoch == epoch
    }

    /// Apply `next` if `epoch` is still the live attempt.
    fn transition(
        &self,
        epoch: u64,
        next: impl FnOnce(&SessionState) -> Option<SessionState>,
    ) -> bool {
        let lifecycle = lock(&self.lifecycle);
        if lifecycle.epoch != epoch {
            debug!(epoch, current = lifecycle.epoch, "Ignoring event from stale session");
            return false;
        }

        self.state_tx.send_if_modified(|state| match next(state) {
            Some(new_state) if new_state != *state => {
                debug!(from = %state, to = %new_state, "Session state changed");
                *state = new_state;
                true
            }
            _ => false,
        })
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wahoo_ipc::LoopbackTransport;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn manager(transport: &LoopbackTransport) -> Arc<SessionManager<LoopbackTransport>> {
        Arc::new(SessionManager::new(transport.clone()))
    }

    async fn wait_for(
        session: &SessionManager<LoopbackTransport>,
        predicate: impl FnMut(&SessionState) -> bool,
    ) -> SessionState {
        let mut rx = session.subscribe();
        let state = tokio::time::timeout(WAIT, rx.wait_for(predicate))
            .await
            .expect("timed out waiting for session state")
            .expect("state channel closed");
        state.clone()
    }

    #[tokio::test]
    async fn test_connect_reaches_connected() {
        let transport = LoopbackTransport::new().auto_connect();
        let session = manager(&transport);
        assert_eq!(session.state(), SessionState::Disconnected);

        session.connect();
        assert_eq!(session.state(), SessionState::Connecting);

        wait_for(&session, SessionState::is_connected).await;
        assert!(session.is_connected());
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_is_noop_while_active() {
        let transport = LoopbackTransport::new().auto_connect();
        let session = manager(&transport);

        session.connect();
        session.connect();
        wait_for(&session, SessionState::is_connected).await;
        session.connect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_sets_error() {
        let transport = LoopbackTransport::new();
        transport.set_connect_failure(Some("bun: not found"));
        let session = manager(&transport);

        session.connect();
        let state = wait_for(&session, |s| matches!(s, SessionState::Error(_))).await;
        assert!(state.to_string().contains("bun: not found"));
    }

    #[tokio::test]
    async fn test_remote_disconnect_and_stream_end() {
        let transport = LoopbackTransport::new().auto_connect();
        let session = manager(&transport);
        session.connect();
        wait_for(&session, SessionState::is_connected).await;

        transport
            .emit(BridgeEvent::Disconnected {
                reason: "connection lost".into(),
            })
            .await;
        let state = wait_for(&session, |s| matches!(s, SessionState::Error(_))).await;
        assert_eq!(state, SessionState::Error("connection lost".into()));

        session.reconnect();
        wait_for(&session, SessionState::is_connected).await;

        transport.close_stream();
        let state = wait_for(&session, |s| matches!(s, SessionState::Error(_))).await;
        assert_eq!(state, SessionState::Error("session stream closed".into()));
        assert_eq!(transport.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let transport = LoopbackTransport::new().auto_connect();
        let session = manager(&transport);

        // never connected
        session.disconnect().await;
        assert_eq!(transport.disconnect_count(), 0);

        session.connect();
        wait_for(&session, SessionState::is_connected).await;

        session.disconnect().await;
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(transport.disconnect_count(), 1);

        // reconnect only applies to a connected or failed session
        session.reconnect();
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_stale_events_are_ignored() {
        let transport = LoopbackTransport::new();
        let session = manager(&transport);
        session.connect();
        // let the first attempt open its stream
        tokio::time::timeout(WAIT, async {
            while transport.connect_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        session.disconnect().await;
        assert!(!transport.emit(BridgeEvent::Connected { phone_number: None }).await);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_pairing_code_published_and_cleared() {
        let transport = LoopbackTransport::new();
        let session = manager(&transport);
        let mut codes = session.pairing_codes();

        session.connect();
        tokio::time::timeout(WAIT, async {
            while !transport.emit(BridgeEvent::QrCode { qr: "2@abc".into() }).await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let code = tokio::time::timeout(WAIT, codes.wait_for(Option::is_some))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(code.as_deref(), Some("2@abc"));

        transport.emit(BridgeEvent::Connected { phone_number: None }).await;
        wait_for(&session, SessionState::is_connected).await;
        tokio::time::timeout(WAIT, codes.wait_for(Option::is_none))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_data_events_are_forwarded_with_epoch() {
        let transport = LoopbackTransport::new().auto_connect();
        let session = manager(&transport);
        let mut inbound = session.take_event_receiver().unwrap();
        assert!(session.take_event_receiver().is_none());

        session.connect();
        wait_for(&session, SessionState::is_connected).await;
        transport
            .emit(BridgeEvent::HistorySyncComplete { messages_count: 3 })
            .await;

        let event = tokio::time::timeout(WAIT, inbound.recv()).await.unwrap().unwrap();
        assert_eq!(event.epoch, 1);
        assert!(matches!(
            event.payload,
            InboundPayload::HistorySyncComplete { messages_count: 3 }
        ));
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let transport = LoopbackTransport::new().auto_connect();
        let session = manager(&transport);

        let outcome = session.send_message("5511999999999", "hi").await;
        assert_eq!(outcome, SendOutcome::failed(NOT_CONNECTED));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_normalizes_recipient() {
        let transport = LoopbackTransport::new().auto_connect();
        let session = manager(&transport);
        session.connect();
        wait_for(&session, SessionState::is_connected).await;

        let outcome = session.send_message("+55 (11) 99999-9999", "hi").await;
        assert!(outcome.ok);
        assert_eq!(
            transport.sent(),
            vec![("5511999999999@s.whatsapp.net".to_string(), "hi".to_string())]
        );

        let outcome = session.send_message("not a number", "hi").await;
        assert!(!outcome.ok);
        assert!(outcome.detail.contains("Invalid recipient"));
    }

    #[tokio::test]
    async fn test_send_rejection_is_reported() {
        let transport = LoopbackTransport::new().auto_connect();
        transport.set_send_rejection(Some("not on whatsapp"));
        let session = manager(&transport);
        session.connect();
        wait_for(&session, SessionState::is_connected).await;

        let outcome = session.send_message("123@s.whatsapp.net", "hi").await;
        assert_eq!(outcome, SendOutcome::failed("not on whatsapp"));
    }
}
