//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use media_gateway::config::schema::RouteConfig;
use media_gateway::config::{GatewayConfig, LimitClass};
use media_gateway::http::HttpServer;
use media_gateway::lifecycle::Shutdown;
use media_gateway::security::access_control::Tier;
use media_gateway::upstream::BackendId;

/// Start a mock backend that returns a fixed status and body.
#[allow(dead_code)]
pub async fn start_mock_backend(status: u16, body: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (status, body.to_string()) }).await
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = std::sync::Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        // Read (and discard) the request head before answering.
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// An address nothing listens on (bound, then dropped).
#[allow(dead_code)]
pub async fn dead_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Gateway config wired to the given backends, tuned for fast tests.
pub fn test_config(content: SocketAddr, processing: SocketAddr, analytics: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();

    config.backends.content.base_url = format!("http://{}", content);
    config.backends.processing.base_url = format!("http://{}", processing);
    config.backends.analytics.base_url = format!("http://{}", analytics);
    config.backends.content.timeout_secs = 2;
    config.backends.processing.timeout_secs = 2;
    config.backends.analytics.timeout_secs = 2;

    config.retries.max_attempts = 3;
    config.retries.backoff_base = 2.0;
    config.retries.max_delay_ms = 50; // keep retries fast under test

    config.circuit_breaker.failure_threshold = 5;
    config.circuit_breaker.break_secs = 30;

    config.aggregation.deadline_secs = 4;
    config.health_check.timeout_secs = 1;

    config.routes.push(RouteConfig {
        name: "videos".to_string(),
        host: None,
        path_prefix: "/videos".to_string(),
        backend: BackendId::Content,
        rewrite_prefix: None,
        tier: Tier::Standard,
        limit_class: LimitClass::Standard,
        priority: 0,
    });

    config
}

/// Start the gateway on an ephemeral port.
pub async fn start_gateway(config: GatewayConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let server = HttpServer::new(config).expect("valid test config");
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    // Give the server a beat to start accepting.
    tokio::time::sleep(Duration::from_millis(100)).await;
    (addr, shutdown)
}

/// A reqwest client that will not reuse pooled connections.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
