//! In-process transport that stands in for the bridge in tests.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use wahoo_core::BridgeEvent;

use crate::error::{IpcError, Result};
use crate::transport::{EventReceiver, SendReceipt, SessionTransport};

#[derive(Default)]
struct LoopbackState {
    event_tx: Option<mpsc::Sender<BridgeEvent>>,
    auto_connect: bool,
    fail_connect: Option<String>,
    reject_sends: Option<String>,
    connects: usize,
    disconnects: usize,
    sent: Vec<(String, String)>,
}

/// Cloneable handle; every clone drives the same fake session.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `Connected` as soon as a stream is opened.
    pub fn auto_connect(self) -> Self {
        self.lock().auto_connect = true;
        self
    }

    /// Make every following `connect` fail until cleared with `None`.
    pub fn set_connect_failure(&self, reason: Option<&str>) {
        self.lock().fail_connect = reason.map(String::from);
    }

    /// Make every following send come back rejected until cleared with `None`.
    pub fn set_send_rejection(&self, reason: Option<&str>) {
        self.lock().reject_sends = reason.map(String::from);
    }

    /// Push an event into the current stream. `false` if no stream is open.
    pub async fn emit(&self, event: BridgeEvent) -> bool {
        let tx = self.lock().event_tx.clone();
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// End the current stream as if the remote side went away.
    pub fn close_stream(&self) {
        self.lock().event_tx = None;
    }

    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    pub fn disconnect_count(&self) -> usize {
        self.lock().disconnects
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.lock().sent.clone()
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionTransport for LoopbackTransport {
    async fn connect(&self) -> Result<EventReceiver> {
        let mut state = self.lock();
        state.connects += 1;

        if let Some(reason) = &state.fail_connect {
            return Err(IpcError::SpawnFailed(reason.clone()));
        }

        let (tx, rx) = mpsc::channel(100);
        if state.auto_connect {
            let _ = tx.try_send(BridgeEvent::Connected { phone_number: None });
        }
        state.event_tx = Some(tx);

        Ok(rx)
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.lock();
        state.disconnects += 1;
        state.event_tx = None;
        Ok(())
    }

    async fn send_text(&self, to: &str, content: &str) -> Result<SendReceipt> {
        let mut state = self.lock();
        state.sent.push((to.to_string(), content.to_string()));

        Ok(match &state.reject_sends {
            Some(reason) => SendReceipt {
                success: false,
                detail: reason.clone(),
            },
            None => SendReceipt {
                success: true,
                detail: format!("Message sent to {}", to),
            },
        })
    }
}
