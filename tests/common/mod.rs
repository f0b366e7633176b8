//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use request_guard::config::GuardConfig;
use request_guard::session::{idle_expiry, MemoryStore, USER_ID_KEY};
use request_guard::{GuardServer, Shutdown};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A guard server running on an ephemeral loopback port.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: MemoryStore,
    pub shutdown: Shutdown,
    pub task: JoinHandle<()>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Seed a logged-in session and return its cookie header value.
    pub async fn login_cookie(&self, user_id: &str) -> String {
        let session = tower_sessions::Session::new(
            None,
            Arc::new(self.store.clone()),
            Some(idle_expiry(60)),
        );
        session.insert(USER_ID_KEY, user_id).await.unwrap();
        session.save().await.unwrap();
        format!("guard_session={}", session.id().unwrap())
    }
}

/// Start the guard in front of `app`.
pub async fn start_guard(config: GuardConfig, app: Router) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = GuardServer::new(config, app);
    let store = server.store();
    let server_shutdown = shutdown.subscribe();

    let task = tokio::spawn(async move {
        server.run(listener, server_shutdown).await.unwrap();
    });

    // Listener is already bound; a short yield lets the accept loop start.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        store,
        shutdown,
        task,
    }
}

/// Client that keeps cookies and does not follow redirects.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .cookie_store(true)
        .no_proxy()
        .build()
        .unwrap()
}
