use std::future::Future;

use tokio::sync::mpsc;
use wahoo_core::BridgeEvent;

use crate::error::Result;

pub type EventReceiver = mpsc::Receiver<BridgeEvent>;

/// Outcome reported by the remote session for a submitted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub success: bool,
    pub detail: String,
}

/// The live connection to the messaging network.
///
/// Uses native async fn in traits (no async_trait macro); callers are generic
/// over the transport.
pub trait SessionTransport: Send + Sync + 'static {
    /// Establish a session and hand back its inbound event stream.
    ///
    /// Every call starts a fresh stream; the previous one, if any, ends.
    fn connect(&self) -> impl Future<Output = Result<EventReceiver>> + Send;

    /// Release the session. Calling it without a live session is a no-op.
    fn disconnect(&self) -> impl Future<Output = Result<()>> + Send;

    /// Submit a text message. `Err` means the submission never reached the
    /// session; a rejection by the session is an `Ok` with `success == false`.
    fn send_text(
        &self,
        to: &str,
        content: &str,
    ) -> impl Future<Output = Result<SendReceipt>> + Send;
}
