//! Integration tests for event listeners over both transports

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::stream;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

use common::{find_available_port, serve};
use marathon::events::{EventPayload, CALLBACK_PATH};
use marathon::{Client, Config, Error, Event, EventFilter, EventKind, EventsTransport};

// ============================================================================
// Fake Marathon event bus
// ============================================================================

#[derive(Default)]
struct Bus {
    callbacks: Mutex<Vec<String>>,
    posts: AtomicUsize,
    deletes: AtomicUsize,
    streams: AtomicUsize,
}

type CallbackQuery = Query<HashMap<String, String>>;

async fn list_subscriptions(State(bus): State<Arc<Bus>>) -> impl IntoResponse {
    let callbacks = bus.callbacks.lock().unwrap().clone();
    Json(json!({ "callbackUrls": callbacks }))
}

async fn add_subscription(State(bus): State<Arc<Bus>>, Query(query): CallbackQuery) -> impl IntoResponse {
    bus.posts.fetch_add(1, Ordering::SeqCst);
    let url = query.get("callbackUrl").cloned().unwrap_or_default();
    bus.callbacks.lock().unwrap().push(url.clone());
    Json(json!({ "callbackUrl": url, "eventType": "subscribe_event" }))
}

async fn remove_subscription(State(bus): State<Arc<Bus>>, Query(query): CallbackQuery) -> impl IntoResponse {
    bus.deletes.fetch_add(1, Ordering::SeqCst);
    let url = query.get("callbackUrl").cloned().unwrap_or_default();
    bus.callbacks.lock().unwrap().retain(|c| *c != url);
    Json(json!({ "callbackUrl": url, "eventType": "unsubscribe_event" }))
}

const STREAM_EVENTS: &[&str] = &[
    "event: status_update_event\ndata: {\"eventType\":\"status_update_event\",\"appId\":\"/my-app\",\"taskStatus\":\"TASK_RUNNING\"}\n\n",
    ": keep-alive\n\nevent: instance_changed_event\ndata: {\"eventType\":\"instance_changed_event\"}\n\n",
    "event: deployment_success\ndata: {\"eventType\":\"deploy",
    "ment_success\",\"id\":\"d-1\"}\r\n\r\n",
];

async fn event_stream(State(bus): State<Arc<Bus>>) -> impl IntoResponse {
    bus.streams.fetch_add(1, Ordering::SeqCst);
    let chunks = stream::iter(
        STREAM_EVENTS
            .iter()
            .copied()
            .map(|chunk| Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes())))
            .collect::<Vec<_>>(),
    )
    .chain(stream::pending());

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(chunks),
    )
}

fn fake_bus(bus: Arc<Bus>) -> Router {
    Router::new()
        .route("/ping", get(|| async { "pong" }))
        .route(
            "/v2/eventSubscriptions",
            get(list_subscriptions)
                .post(add_subscription)
                .delete(remove_subscription),
        )
        .route("/v2/events", get(event_stream))
        .with_state(bus)
}

async fn recv(rx: &mut mpsc::Receiver<Event>) -> Event {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("channel closed")
}

async fn assert_silent(rx: &mut mpsc::Receiver<Event>) {
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
}

// ============================================================================
// Callback transport
// ============================================================================

async fn callback_client(bus: Arc<Bus>) -> (Client, String) {
    let host = serve(fake_bus(bus)).await;
    let port = find_available_port();
    let config = Config::new(format!("http://{}", host))
        .with_events_transport(EventsTransport::Callback)
        .with_events_listener("lo", port);
    let callback_url = format!("http://127.0.0.1:{}{}", port, CALLBACK_PATH);
    (Client::new(config).unwrap(), callback_url)
}

async fn post_event(callback_url: &str, body: serde_json::Value) -> StatusCode {
    reqwest::Client::new()
        .post(callback_url)
        .json(&body)
        .send()
        .await
        .expect("callback post failed")
        .status()
}

#[tokio::test]
async fn test_callback_listeners_receive_matching_events() {
    let bus = Arc::new(Bus::default());
    let (client, callback_url) = callback_client(bus.clone()).await;

    let (apps_tx, mut apps_rx) = mpsc::channel(8);
    let (deploy_tx, mut deploy_rx) = mpsc::channel(8);
    client
        .add_events_listener(apps_tx.clone(), EventFilter::APPLICATIONS)
        .await
        .unwrap();
    client
        .add_events_listener(deploy_tx.clone(), EventFilter::DEPLOYMENTS | EventKind::StatusUpdate)
        .await
        .unwrap();

    // registered once, with the listener address
    assert_eq!(bus.posts.load(Ordering::SeqCst), 1);
    assert_eq!(*bus.callbacks.lock().unwrap(), vec![callback_url.clone()]);
    assert!(client.has_subscription(&callback_url).await.unwrap());

    let status = post_event(
        &callback_url,
        json!({"eventType": "status_update_event", "appId": "/my-app", "taskStatus": "TASK_RUNNING"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let status = post_event(&callback_url, json!({"eventType": "deployment_info"})).await;
    assert_eq!(status, StatusCode::OK);

    let event = recv(&mut apps_rx).await;
    assert_eq!(event.kind, EventKind::StatusUpdate);
    match event.payload {
        EventPayload::StatusUpdate(update) => assert_eq!(update.app_id, "/my-app"),
        other => panic!("unexpected payload {:?}", other),
    }
    assert_silent(&mut apps_rx).await;

    assert_eq!(recv(&mut deploy_rx).await.kind, EventKind::StatusUpdate);
    assert_eq!(recv(&mut deploy_rx).await.kind, EventKind::DeploymentInfo);

    client.remove_events_listener(&apps_tx).await;
    client.remove_events_listener(&deploy_tx).await;
}

#[tokio::test]
async fn test_unknown_callback_event_is_dropped() {
    let bus = Arc::new(Bus::default());
    let (client, callback_url) = callback_client(bus.clone()).await;

    let (tx, mut rx) = mpsc::channel(8);
    client.add_events_listener(tx.clone(), EventFilter::ALL).await.unwrap();

    let status = post_event(&callback_url, json!({"eventType": "instance_changed_event"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_silent(&mut rx).await;

    client.remove_events_listener(&tx).await;
}

#[tokio::test]
async fn test_last_listener_unsubscribes_once() {
    let bus = Arc::new(Bus::default());
    let (client, callback_url) = callback_client(bus.clone()).await;

    let (first, _first_rx) = mpsc::channel(8);
    let (second, _second_rx) = mpsc::channel(8);
    client.add_events_listener(first.clone(), EventFilter::ALL).await.unwrap();
    client.add_events_listener(second.clone(), EventFilter::ALL).await.unwrap();
    // adding the same channel twice changes nothing
    client.add_events_listener(first.clone(), EventFilter::APPLICATIONS).await.unwrap();
    assert_eq!(bus.posts.load(Ordering::SeqCst), 1);

    client.remove_events_listener(&first).await;
    assert_eq!(bus.deletes.load(Ordering::SeqCst), 0);

    client.remove_events_listener(&second).await;
    assert_eq!(bus.deletes.load(Ordering::SeqCst), 1);
    assert!(!client.has_subscription(&callback_url).await.unwrap());

    // removing again is a no-op
    client.remove_events_listener(&second).await;
    client.remove_events_listener(&first).await;
    assert_eq!(bus.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_existing_subscription_is_not_posted_again() {
    let bus = Arc::new(Bus::default());
    let (client, callback_url) = callback_client(bus.clone()).await;
    bus.callbacks.lock().unwrap().push(callback_url.clone());

    let (tx, _rx) = mpsc::channel(8);
    client.add_events_listener(tx.clone(), EventFilter::ALL).await.unwrap();
    assert_eq!(bus.posts.load(Ordering::SeqCst), 0);

    client.remove_events_listener(&tx).await;
    assert_eq!(bus.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_callback_url_override_is_registered() {
    let bus = Arc::new(Bus::default());
    let host = serve(fake_bus(bus.clone())).await;
    let config = Config::new(format!("http://{}", host))
        .with_events_listener("lo", find_available_port())
        .with_callback_url("http://proxy.example.com:8000/event");
    let client = Client::new(config).unwrap();

    let (tx, _rx) = mpsc::channel(8);
    client.add_events_listener(tx.clone(), EventFilter::ALL).await.unwrap();
    assert_eq!(
        *bus.callbacks.lock().unwrap(),
        vec!["http://proxy.example.com:8000/event".to_string()]
    );

    client.unsubscribe().await.unwrap();
    assert!(bus.callbacks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_listener_added_after_unsubscribe_registers_again() {
    let bus = Arc::new(Bus::default());
    let (client, callback_url) = callback_client(bus.clone()).await;

    let (first, mut first_rx) = mpsc::channel(8);
    client.add_events_listener(first.clone(), EventFilter::ALL).await.unwrap();
    client.unsubscribe().await.unwrap();
    assert!(bus.callbacks.lock().unwrap().is_empty());

    let (second, mut second_rx) = mpsc::channel(8);
    client.add_events_listener(second.clone(), EventFilter::ALL).await.unwrap();
    assert_eq!(bus.posts.load(Ordering::SeqCst), 2);
    assert_eq!(*bus.callbacks.lock().unwrap(), vec![callback_url.clone()]);

    // the listener kept across unsubscribe is served again too
    let status = post_event(&callback_url, json!({"eventType": "deployment_info"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recv(&mut first_rx).await.kind, EventKind::DeploymentInfo);
    assert_eq!(recv(&mut second_rx).await.kind, EventKind::DeploymentInfo);

    client.remove_events_listener(&first).await;
    client.remove_events_listener(&second).await;
    assert!(bus.callbacks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_ephemeral_listener_port_is_registered() {
    let bus = Arc::new(Bus::default());
    let host = serve(fake_bus(bus.clone())).await;
    let config = Config::new(format!("http://{}", host))
        .with_events_transport(EventsTransport::Callback)
        .with_events_listener("lo", 0);
    let client = Client::new(config).unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    client.add_events_listener(tx.clone(), EventFilter::ALL).await.unwrap();

    let registered = bus.callbacks.lock().unwrap().clone();
    assert_eq!(registered.len(), 1);
    let callback_url = registered[0].clone();
    assert!(callback_url.starts_with("http://127.0.0.1:"));
    assert!(!callback_url.ends_with(":0/event"), "registered {}", callback_url);

    // the registered URL reaches the listener
    let status = post_event(&callback_url, json!({"eventType": "deployment_info"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recv(&mut rx).await.kind, EventKind::DeploymentInfo);

    client.remove_events_listener(&tx).await;
    assert_eq!(bus.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_callback_start_failure_records_nothing() {
    let bus = Arc::new(Bus::default());
    let host = serve(fake_bus(bus.clone())).await;
    let config = Config::new(format!("http://{}", host)).with_events_listener("nothing", 0);
    let client = Client::new(config).unwrap();

    let (tx, _rx) = mpsc::channel(8);
    let result = client.add_events_listener(tx.clone(), EventFilter::ALL).await;
    assert!(matches!(result, Err(Error::InterfaceAddress { .. })));

    // nothing was recorded, so removal does not reach Marathon
    client.remove_events_listener(&tx).await;
    assert_eq!(bus.posts.load(Ordering::SeqCst), 0);
    assert_eq!(bus.deletes.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Stream transport
// ============================================================================

#[tokio::test]
async fn test_stream_delivers_events() {
    let bus = Arc::new(Bus::default());
    let host = serve(fake_bus(bus.clone())).await;
    let config = Config::new(format!("http://{}", host)).with_events_transport(EventsTransport::Stream);
    let client = Client::new(config).unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    client.add_events_listener(tx.clone(), EventFilter::ALL).await.unwrap();
    assert_eq!(bus.streams.load(Ordering::SeqCst), 1);

    // the unknown kind in between is skipped
    assert_eq!(recv(&mut rx).await.kind, EventKind::StatusUpdate);
    let event = recv(&mut rx).await;
    assert_eq!(event.kind, EventKind::DeploymentSuccess);
    match event.payload {
        EventPayload::DeploymentSuccess(result) => assert_eq!(result.id, "d-1"),
        other => panic!("unexpected payload {:?}", other),
    }
    assert_silent(&mut rx).await;

    // stopping the stream makes no remote call
    client.remove_events_listener(&tx).await;
    assert_eq!(bus.deletes.load(Ordering::SeqCst), 0);
    assert_eq!(bus.posts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stream_reopens_for_listener_added_after_unsubscribe() {
    let bus = Arc::new(Bus::default());
    let host = serve(fake_bus(bus.clone())).await;
    let config = Config::new(format!("http://{}", host)).with_events_transport(EventsTransport::Stream);
    let client = Client::new(config).unwrap();

    let (first, _first_rx) = mpsc::channel(8);
    client.add_events_listener(first.clone(), EventFilter::ALL).await.unwrap();
    client.unsubscribe().await.unwrap();

    let (second, mut second_rx) = mpsc::channel(8);
    client.add_events_listener(second.clone(), EventFilter::ALL).await.unwrap();
    assert_eq!(bus.streams.load(Ordering::SeqCst), 2);
    assert_eq!(recv(&mut second_rx).await.kind, EventKind::StatusUpdate);

    client.remove_events_listener(&first).await;
    client.remove_events_listener(&second).await;
}

#[tokio::test]
async fn test_stream_connection_failure() {
    let config = Config::new(format!("http://127.0.0.1:{}", find_available_port()))
        .with_events_transport(EventsTransport::Stream);
    let client = Client::new(config).unwrap();

    let (tx, _rx) = mpsc::channel(8);
    let result = client.add_events_listener(tx, EventFilter::ALL).await;
    assert!(matches!(result, Err(Error::MarathonDown)));
}
