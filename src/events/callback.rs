//! Push-callback transport
//!
//! Runs a small axum listener on the configured interface and registers its
//! URL with Marathon, which then POSTs every event to it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use super::dispatcher::EventDispatcher;
use super::kinds::decode_event;
use super::EventTransport;
use crate::client::request::Pipeline;
use crate::client::subscription;
use crate::client::{Error, Result};
use crate::config::Config;
use crate::net::interface_address;

/// Path Marathon posts events to
pub const CALLBACK_PATH: &str = "/event";

/// How long `stop` waits for the listener task to wind down
const LISTENER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Router serving the callback endpoint
pub fn callback_router(dispatcher: Arc<EventDispatcher>) -> Router {
    Router::new()
        .route(CALLBACK_PATH, post(handle_event))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(dispatcher)
}

// Marathon only cares that the post was accepted, so anything we cannot
// decode is logged and still answered with 200.
async fn handle_event(State(dispatcher): State<Arc<EventDispatcher>>, body: Bytes) -> StatusCode {
    match decode_event(&body) {
        Ok(event) => {
            debug!("Received {} on the callback listener", event.name());
            dispatcher.dispatch(event).await;
        }
        Err(e) => warn!("Dropping callback event: {}", e),
    }
    StatusCode::OK
}

struct Listener {
    callback_url: String,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

pub struct CallbackTransport {
    pipeline: Arc<Pipeline>,
    dispatcher: Arc<EventDispatcher>,
    interface: String,
    port: u16,
    callback_url: Option<String>,
    listener: Mutex<Option<Listener>>,
}

impl CallbackTransport {
    pub fn new(pipeline: Arc<Pipeline>, dispatcher: Arc<EventDispatcher>, config: &Config) -> Self {
        Self {
            pipeline,
            dispatcher,
            interface: config.events_interface.clone(),
            port: config.events_port,
            callback_url: config.callback_url.clone(),
            listener: Mutex::new(None),
        }
    }

    /// URL registered with Marathon while the listener runs
    pub async fn callback_url(&self) -> Option<String> {
        self.listener
            .lock()
            .await
            .as_ref()
            .map(|listener| listener.callback_url.clone())
    }
}

#[async_trait]
impl EventTransport for CallbackTransport {
    async fn start(&self) -> Result<()> {
        let mut listener = self.listener.lock().await;
        if listener.is_some() {
            return Ok(());
        }

        let ip = interface_address(&self.interface)?;
        let address = SocketAddr::new(ip, self.port);
        let bind_error = |source| Error::Bind {
            address: address.to_string(),
            source,
        };
        let tcp = TcpListener::bind(address).await.map_err(bind_error)?;
        // port 0 resolves to an ephemeral port only once bound
        let bound = tcp.local_addr().map_err(bind_error)?;

        let callback_url = self
            .callback_url
            .clone()
            .unwrap_or_else(|| format!("http://{}{}", bound, CALLBACK_PATH));

        let shutdown = CancellationToken::new();
        let router = callback_router(self.dispatcher.clone());
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(tcp, router)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await;
            if let Err(e) = result {
                error!("Callback listener failed: {}", e);
            }
        });
        info!("Events callback listener on {}", bound);

        if let Err(e) = subscription::register(&self.pipeline, &callback_url).await {
            shutdown.cancel();
            return Err(e);
        }

        *listener = Some(Listener {
            callback_url,
            shutdown,
            task,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(listener) = self.listener.lock().await.take() else {
            return Ok(());
        };

        let result = subscription::deregister(&self.pipeline, &listener.callback_url).await;
        listener.shutdown.cancel();
        // the port is free again once the serve task returns
        if tokio::time::timeout(LISTENER_SHUTDOWN_TIMEOUT, listener.task)
            .await
            .is_err()
        {
            warn!("Callback listener still draining connections after shutdown");
        }
        debug!("Events callback listener stopped");
        result
    }

    fn name(&self) -> &'static str {
        "callback"
    }
}
