//! # Marathon event bus
//!
//! Events reach the client through one of two transports:
//!
//! - **callback**: a local HTTP listener registered with Marathon as an event
//!   subscriber; Marathon POSTs every event to it
//! - **stream**: a long-lived `GET /v2/events` server-sent event stream
//!
//! Either way, bodies are decoded into an [`Event`] and handed to the
//! [`EventDispatcher`], which fans them out to subscriber channels by
//! [`EventFilter`].

pub mod callback;
pub mod dispatcher;
pub mod kinds;
pub mod payloads;
pub mod sse;
pub mod stream;

use async_trait::async_trait;

use crate::client::Result;

pub use callback::{callback_router, CallbackTransport, CALLBACK_PATH};
pub use dispatcher::{EventDispatcher, EventsChannel};
pub use kinds::{decode_event, Event, EventError, EventFilter, EventKind, EventPayload};
pub use payloads::*;
pub use sse::{SseMessage, SseParser};
pub use stream::{StreamTransport, EVENTS_PATH, STREAM_RECONNECT_DELAY};

// ============================================================================
// SBIO: Transport seam (callback listener or event stream)
// ============================================================================

/// A way of receiving events from Marathon.
///
/// The client starts the transport when the first listener is added and
/// stops it when the last one is removed.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Begin receiving events and dispatching them
    async fn start(&self) -> Result<()>;

    /// Stop receiving events and release any remote registration
    async fn stop(&self) -> Result<()>;

    /// Short name for logging
    fn name(&self) -> &'static str;
}
