// Shared primitives for one-time relay bootstrapping across integration tests.
#![allow(dead_code)]

use std::{
    // `Arc` shares the published address between threads; `OnceLock` writes it once.
    sync::{Arc, OnceLock},
    time::Duration,
};

use heretic_session::WsConnector;
use heretic_session::use_cases::PeerGame;

// Base HTTP URL published once the relay has bound its port.
static SERVER_URL: OnceLock<String> = OnceLock::new();
// One-time guard so the bootstrap path runs only once per test binary.
static SERVER_READY: OnceLock<()> = OnceLock::new();

// Ensure the relay is running and return its HTTP base URL.
pub fn ensure_server() -> &'static str {
    SERVER_READY.get_or_init(|| {
        let published_url = Arc::new(OnceLock::<String>::new());
        let published_url_thread = Arc::clone(&published_url);
        // Own OS thread and runtime so the relay outlives individual `#[tokio::test]` runtimes.
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                // Ephemeral port to avoid collisions with a locally running relay.
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");
                let _ = published_url_thread.set(format!("http://{}", addr));
                heretic_session::run(listener).await.expect("server failed");
            });
        });
        wait_for_server_url_and_readiness(published_url);
    });

    SERVER_URL
        .get()
        .expect("server url should be initialized")
        .as_str()
}

// WebSocket connector pointed at the shared relay.
pub fn connector() -> WsConnector {
    let base = ensure_server();
    let ws_base = base.replacen("http://", "ws://", 1);
    WsConnector::new(ws_base)
}

// Fresh session name per test so tests sharing the relay never collide.
pub fn unique_session() -> String {
    format!("room-{}", uuid::Uuid::new_v4())
}

// Pump both peers until `done` holds, giving relay tasks time to run in between.
pub async fn pump_until<F>(a: &mut PeerGame, b: &mut PeerGame, mut done: F) -> bool
where
    F: FnMut(&PeerGame, &PeerGame) -> bool,
{
    for _ in 0..200 {
        a.pump_network();
        b.pump_network();
        if done(a, b) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn wait_for_server_url_and_readiness(published_url: Arc<OnceLock<String>>) {
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };

    let _ = SERVER_URL.set(base_url.clone());

    // Strip the scheme so we can use host:port for raw TCP readiness checks.
    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");

    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    panic!("relay did not become ready in time");
}
