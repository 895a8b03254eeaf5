//! Helpers shared by the integration tests: fake Marathon servers on
//! ephemeral localhost ports.

#![allow(dead_code)]

use std::net::TcpListener;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tokio::time::sleep;

/// Find an available port for testing
pub fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to address")
        .local_addr()
        .expect("Failed to get local address")
        .port()
}

/// Serve `app` on `port` and return `127.0.0.1:<port>`
pub async fn serve_on(port: u16, app: Router) -> String {
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .expect("Failed to bind fake Marathon");

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give server time to start
    sleep(Duration::from_millis(100)).await;

    format!("127.0.0.1:{}", port)
}

/// Serve `app` on a fresh port and return `127.0.0.1:<port>`
pub async fn serve(app: Router) -> String {
    serve_on(find_available_port(), app).await
}

/// A Marathon that answers `/ping` and nothing else
pub fn ping_only() -> Router {
    Router::new().route("/ping", get(|| async { "pong" }))
}

/// Poll `check` until it holds or `within` elapses
pub async fn eventually<F, Fut>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    check().await
}
