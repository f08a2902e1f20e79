//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rate_pacer::observability::InMemorySink;
use rate_pacer::{GatewayConfig, GatewayServer, Shutdown};
use tokio::net::TcpListener;

/// A gateway running on an ephemeral port, recording spans in memory.
pub struct TestServer {
    pub addr: SocketAddr,
    pub sink: Arc<InMemorySink>,
    shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gateway admitting `rps` requests per second.
pub async fn spawn_server(rps: i64) -> TestServer {
    let mut config = GatewayConfig::default();
    config.rate_limit.requests_per_second = rps;
    config.listener.bind_address = "127.0.0.1:0".into();

    let sink = Arc::new(InMemorySink::new());
    let server = GatewayServer::new(config, sink.clone()).expect("valid rate budget");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    // Wait for server to accept connections
    for _ in 0..50 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    TestServer {
        addr,
        sink,
        shutdown,
    }
}

/// HTTP client that never reuses connections between tests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
