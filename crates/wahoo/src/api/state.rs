use std::sync::Arc;

use wahoo_db::Store;
use wahoo_ipc::SessionTransport;
use wahoo_worker::SessionManager;

/// Everything a request handler may touch.
pub struct AppState<T: SessionTransport> {
    pub store: Store,
    pub session: Arc<SessionManager<T>>,
}

impl<T: SessionTransport> AppState<T> {
    pub fn new(store: Store, session: Arc<SessionManager<T>>) -> Self {
        Self { store, session }
    }
}

// derive(Clone) would require T: Clone
impl<T: SessionTransport> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            session: Arc::clone(&self.session),
        }
    }
}
