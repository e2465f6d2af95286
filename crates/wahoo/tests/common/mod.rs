//! Common test utilities.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use wahoo::api::{self, AppState};
use wahoo_db::Store;
use wahoo_ipc::LoopbackTransport;
use wahoo_worker::{SessionManager, SessionState};

pub struct TestApp {
    pub router: Router,
    pub store: Store,
    pub transport: LoopbackTransport,
    pub session: Arc<SessionManager<LoopbackTransport>>,
}

/// App backed by a fresh store and a session that has never connected.
pub async fn test_app() -> TestApp {
    let tmp = tempfile::tempdir().unwrap();
    // Leak the TempDir so it doesn't get cleaned up during the test.
    let tmp = Box::leak(Box::new(tmp));

    let store = Store::open(tmp.path()).await.unwrap();
    let transport = LoopbackTransport::new().auto_connect();
    let session = Arc::new(SessionManager::new(transport.clone()));
    let router = api::build_app(AppState::new(store.clone(), session.clone()));

    TestApp {
        router,
        store,
        transport,
        session,
    }
}

/// Same as [`test_app`], with the session connected.
pub async fn connected_app() -> TestApp {
    let app = test_app().await;
    app.session.connect();

    let mut state = app.session.subscribe();
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(SessionState::is_connected))
        .await
        .expect("session did not connect")
        .unwrap();

    app
}
