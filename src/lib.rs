//! Client for the Marathon REST API
//!
//! - multi-host endpoint ring with transparent failover and recovery probes
//! - typed error mapping of Marathon's error bodies
//! - event subscriptions over a push callback or the event stream

pub mod cli;
pub mod client;
pub mod cluster;
pub mod config;
pub mod events;
pub mod net;

pub use client::{Client, Error, Result};
pub use config::{Config, EventsTransport};
pub use events::{Event, EventFilter, EventKind, EventPayload, EventsChannel};
