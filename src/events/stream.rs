//! Server-sent event stream transport
//!
//! Holds one `GET /v2/events` connection open and feeds its frames through
//! the SSE parser into the dispatcher. A dropped stream is reopened after
//! a short delay until the transport is stopped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Response;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dispatcher::EventDispatcher;
use super::kinds::decode_event;
use super::sse::SseParser;
use super::EventTransport;
use crate::client::request::Pipeline;
use crate::client::Result;

/// Event stream endpoint
pub const EVENTS_PATH: &str = "/v2/events";

/// Delay before reopening a stream that ended
pub const STREAM_RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub struct StreamTransport {
    pipeline: Arc<Pipeline>,
    dispatcher: Arc<EventDispatcher>,
    reconnect_delay: Duration,
    reader: Mutex<Option<CancellationToken>>,
}

impl StreamTransport {
    pub fn new(pipeline: Arc<Pipeline>, dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            pipeline,
            dispatcher,
            reconnect_delay: STREAM_RECONNECT_DELAY,
            reader: Mutex::new(None),
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

#[async_trait]
impl EventTransport for StreamTransport {
    async fn start(&self) -> Result<()> {
        let mut reader = self.reader.lock().await;
        if reader.is_some() {
            return Ok(());
        }

        let response = self.pipeline.open_stream(EVENTS_PATH).await?;
        info!("Attached to the Marathon event stream");

        let shutdown = CancellationToken::new();
        tokio::spawn(read_events(
            self.pipeline.clone(),
            self.dispatcher.clone(),
            response,
            self.reconnect_delay,
            shutdown.clone(),
        ));

        *reader = Some(shutdown);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(shutdown) = self.reader.lock().await.take() {
            shutdown.cancel();
            debug!("Detached from the Marathon event stream");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stream"
    }
}

async fn read_events(
    pipeline: Arc<Pipeline>,
    dispatcher: Arc<EventDispatcher>,
    first: Response,
    reconnect_delay: Duration,
    shutdown: CancellationToken,
) {
    let mut next = Some(first);

    loop {
        let response = match next.take() {
            Some(response) => response,
            None => {
                let opened = tokio::select! {
                    opened = pipeline.open_stream(EVENTS_PATH) => opened,
                    _ = shutdown.cancelled() => return,
                };
                match opened {
                    Ok(response) => {
                        info!("Reattached to the Marathon event stream");
                        response
                    }
                    Err(e) => {
                        warn!("Failed to reopen the event stream: {}", e);
                        tokio::select! {
                            _ = tokio::time::sleep(reconnect_delay) => {}
                            _ = shutdown.cancelled() => return,
                        }
                        continue;
                    }
                }
            }
        };

        tokio::select! {
            _ = consume(response, &dispatcher) => {
                warn!("Event stream ended, reconnecting in {:?}", reconnect_delay);
            }
            _ = shutdown.cancelled() => return,
        }

        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = shutdown.cancelled() => return,
        }
    }
}

async fn consume(response: Response, dispatcher: &EventDispatcher) {
    let mut parser = SseParser::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Error reading the event stream: {}", e);
                return;
            }
        };

        for message in parser.feed(&chunk) {
            match decode_event(message.data.as_bytes()) {
                Ok(event) => dispatcher.dispatch(event).await,
                Err(e) => debug!("Skipping stream event {:?}: {}", message.event, e),
            }
        }
    }
}
