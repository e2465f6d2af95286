mod bridge;
mod error;
#[cfg(feature = "test-util")]
mod loopback;
mod process;
mod transport;

pub use bridge::{BridgeConfig, BridgeProcess};
pub use error::IpcError;
#[cfg(feature = "test-util")]
pub use loopback::LoopbackTransport;
pub use transport::{EventReceiver, SendReceipt, SessionTransport};
