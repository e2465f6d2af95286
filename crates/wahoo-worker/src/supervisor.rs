use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wahoo_ipc::SessionTransport;

use crate::policy::ReconnectPolicy;
use crate::session::SessionManager;
use crate::state::SessionState;

/// Keeps the session alive: connects once, then reconnects after failures
/// for as long as the policy allows.
pub struct Supervisor<T: SessionTransport, P: ReconnectPolicy> {
    session: Arc<SessionManager<T>>,
    policy: P,
    cancel: CancellationToken,
}

impl<T: SessionTransport, P: ReconnectPolicy> Supervisor<T, P> {
    pub fn new(session: Arc<SessionManager<T>>, policy: P, cancel: CancellationToken) -> Self {
        Self {
            session,
            policy,
            cancel,
        }
    }

    pub async fn run(mut self) {
        let mut state_rx = self.session.subscribe();
        let mut consecutive_failures = 0u32;

        self.session.connect();

        loop {
            let state = state_rx.borrow_and_update().clone();
            match state {
                SessionState::Connected => {
                    if consecutive_failures > 0 {
                        info!(consecutive_failures, "Session recovered");
                    }
                    consecutive_failures = 0;
                }
                SessionState::Error(reason) => {
                    consecutive_failures += 1;
                    match self.policy.next_delay(consecutive_failures) {
                        Some(delay) => {
                            info!(
                                attempt = consecutive_failures,
                                delay_ms = delay.as_millis() as u64,
                                reason = %reason,
                                "Reconnecting session"
                            );
                            tokio::select! {
                                _ = self.cancel.cancelled() => break,
                                _ = tokio::time::sleep(delay) => {}
                            }
                            self.session.reconnect();
                        }
                        None => warn!(
                            attempts = consecutive_failures,
                            reason = %reason,
                            "Giving up on reconnecting session"
                        ),
                    }
                }
                SessionState::Disconnected | SessionState::Connecting => {}
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Session supervisor stopped");
    }
}
