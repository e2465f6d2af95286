mod error;
mod events;
mod policy;
mod session;
mod state;
mod supervisor;
mod sync;

pub use error::WorkerError;
pub use events::{InboundEvent, InboundPayload};
pub use policy::{ExponentialBackoff, NeverReconnect, ReconnectPolicy};
pub use session::{NOT_CONNECTED, SessionManager};
pub use state::{SendOutcome, SessionState};
pub use supervisor::Supervisor;
pub use sync::{SyncBridge, SyncCursor};
