//! # Marathon client
//!
//! [`Client`] is the entry point: it owns the request pipeline (and through
//! it the endpoint ring), the event dispatcher and the configured event
//! transport. It is cheap to clone and safe to share between tasks.

pub mod error;
pub mod request;
pub mod subscription;
pub mod wait;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::EndpointRing;
use crate::config::{Config, EventsTransport};
use crate::events::{
    CallbackTransport, EventDispatcher, EventFilter, EventTransport, EventsChannel, StreamTransport,
};

pub use error::{ApiError, ApiErrorKind, Error, Result};
pub use request::{Pipeline, RawResponse};
pub use subscription::Subscriptions;
pub use wait::deadline;

/// Poll interval of [`Client::wait_on_deployment`]
pub const DEPLOYMENT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Poll interval of [`Client::wait_on_application`]
pub const APPLICATION_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Wait applied by [`Client::wait_on_deployment`] when given a zero timeout
pub const DEFAULT_DEPLOYMENT_TIMEOUT: Duration = Duration::from_secs(900);

// ============================================================================
// Data structures (pure, no I/O)
// ============================================================================

/// A deployment in progress
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Deployment {
    pub id: String,
    pub version: String,
    pub affected_apps: Vec<String>,
    pub current_step: u32,
    pub total_steps: u32,
}

/// Handle of a deployment started by a call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentId {
    pub deployment_id: String,
    pub version: String,
}

/// The part of an application definition needed to follow its rollout
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationStatus {
    pub id: String,
    pub instances: u32,
    pub tasks_running: u32,
    pub tasks_staged: u32,
    pub tasks_healthy: u32,
    pub tasks_unhealthy: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<serde_json::Value>>,
}

impl ApplicationStatus {
    /// True once every requested instance is running (or none are requested)
    pub fn all_tasks_running(&self) -> bool {
        if self.instances == 0 {
            return true;
        }
        self.tasks.is_some() && self.tasks_running == self.instances
    }
}

#[derive(Debug, Deserialize)]
struct ApplicationWrapper {
    app: ApplicationStatus,
}

#[derive(Debug, Deserialize)]
struct LeaderInfo {
    leader: String,
}

#[derive(Debug, Deserialize)]
struct MessageInfo {
    #[serde(default)]
    message: String,
}

// ============================================================================
// Client
// ============================================================================

struct Inner {
    config: Config,
    pipeline: Arc<Pipeline>,
    dispatcher: Arc<EventDispatcher>,
    transport: Box<dyn EventTransport>,
    listeners: Mutex<()>,
}

/// Marathon API client
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.inner.config.url)
            .field("transport", &self.inner.transport.name())
            .finish()
    }
}

impl Client {
    /// Build a client; fails when the URL is not a valid Marathon endpoint.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        let pipeline = Arc::new(Pipeline::new(&config)?);
        let dispatcher = Arc::new(EventDispatcher::new());

        let transport: Box<dyn EventTransport> = match config.events_transport {
            EventsTransport::Callback => Box::new(CallbackTransport::new(
                pipeline.clone(),
                dispatcher.clone(),
                &config,
            )),
            EventsTransport::Stream => {
                Box::new(StreamTransport::new(pipeline.clone(), dispatcher.clone()))
            }
        };

        info!(
            "Marathon client for {} ({} member(s), {} events)",
            config.url,
            pipeline.ring().size(),
            transport.name()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                pipeline,
                dispatcher,
                transport,
                listeners: Mutex::new(()),
            }),
        })
    }

    /// The configured Marathon URL
    pub fn url(&self) -> &str {
        &self.inner.config.url
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The endpoint ring, for membership introspection
    pub fn ring(&self) -> &EndpointRing {
        self.inner.pipeline.ring()
    }

    // ------------------------------------------------------------------------
    // Generic API access
    // ------------------------------------------------------------------------

    /// Perform an arbitrary API call with a pre-encoded body
    pub async fn execute(&self, method: Method, path: &str, body: Option<String>) -> Result<RawResponse> {
        self.inner.pipeline.execute(method, path, body).await
    }

    /// Perform an API call with a JSON body and decode the response
    pub async fn api_request<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.inner.pipeline.request(method, path, body).await
    }

    pub async fn api_get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.inner.pipeline.get(path).await
    }

    pub async fn api_post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.inner.pipeline.request(Method::POST, path, Some(body)).await
    }

    pub async fn api_put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.inner.pipeline.request(Method::PUT, path, Some(body)).await
    }

    pub async fn api_delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.inner.pipeline.request::<(), T>(Method::DELETE, path, None).await
    }

    // ------------------------------------------------------------------------
    // Cluster
    // ------------------------------------------------------------------------

    /// Check that Marathon answers `/ping`
    pub async fn ping(&self) -> Result<()> {
        self.execute(Method::GET, crate::cluster::PING_PATH, None).await?;
        Ok(())
    }

    /// Raw `/v2/info` document
    pub async fn info(&self) -> Result<serde_json::Value> {
        self.api_get("/v2/info").await
    }

    /// Address of the current leader
    pub async fn leader(&self) -> Result<String> {
        let info: LeaderInfo = self.api_get("/v2/leader").await?;
        Ok(info.leader)
    }

    /// Ask the current leader to step down; returns Marathon's message
    pub async fn abdicate_leader(&self) -> Result<String> {
        let info: MessageInfo = self.api_delete("/v2/leader").await?;
        Ok(info.message)
    }

    // ------------------------------------------------------------------------
    // Event subscriptions
    // ------------------------------------------------------------------------

    /// Callback URLs registered with Marathon
    pub async fn subscriptions(&self) -> Result<Subscriptions> {
        subscription::list(&self.inner.pipeline).await
    }

    pub async fn has_subscription(&self, callback_url: &str) -> Result<bool> {
        Ok(self.subscriptions().await?.contains(callback_url))
    }

    /// Register an arbitrary callback URL with Marathon
    pub async fn subscribe(&self, callback_url: &str) -> Result<()> {
        subscription::register(&self.inner.pipeline, callback_url).await
    }

    /// Remove an arbitrary callback URL from Marathon
    pub async fn unsubscribe_callback(&self, callback_url: &str) -> Result<()> {
        subscription::deregister(&self.inner.pipeline, callback_url).await
    }

    /// Deliver events matching `filter` to `channel`.
    ///
    /// Every add makes sure the event transport is running, so a listener
    /// added after [`Client::unsubscribe`] registers with Marathon again. If
    /// the transport fails to start the listener is not recorded. Adding a
    /// channel twice keeps the first registration.
    pub async fn add_events_listener(&self, channel: EventsChannel, filter: EventFilter) -> Result<()> {
        let _guard = self.inner.listeners.lock().await;

        // no-op while the transport is already running
        self.inner.transport.start().await?;

        if !self.inner.dispatcher.add(channel, filter).await {
            debug!("Events listener already registered");
        }
        Ok(())
    }

    /// Stop delivering events to `channel`; the last listener stops the
    /// transport.
    pub async fn remove_events_listener(&self, channel: &EventsChannel) {
        let _guard = self.inner.listeners.lock().await;

        if self.inner.dispatcher.remove(channel).await == Some(true) {
            if let Err(e) = self.inner.transport.stop().await {
                warn!("Failed to stop the {} event transport: {}", self.inner.transport.name(), e);
            }
        }
    }

    /// Stop the event transport and drop the Marathon registration.
    ///
    /// Registered listeners stay recorded but receive nothing until the next
    /// [`Client::add_events_listener`] restarts the transport. Use
    /// [`Client::remove_events_listener`] to forget a listener.
    pub async fn unsubscribe(&self) -> Result<()> {
        let _guard = self.inner.listeners.lock().await;
        self.inner.transport.stop().await
    }

    // ------------------------------------------------------------------------
    // Deployments and applications
    // ------------------------------------------------------------------------

    pub async fn deployments(&self) -> Result<Vec<Deployment>> {
        self.api_get("/v2/deployments").await
    }

    pub async fn has_deployment(&self, id: &str) -> Result<bool> {
        Ok(self.deployments().await?.iter().any(|d| d.id == id))
    }

    /// Cancel a deployment.
    ///
    /// Without `force` Marathon rolls the change back and returns the id of
    /// the rollback deployment; with `force` it just stops and returns
    /// nothing.
    pub async fn delete_deployment(&self, id: &str, force: bool) -> Result<Option<DeploymentId>> {
        let path = format!("/v2/deployments/{}", id.trim_start_matches('/'));

        if force {
            self.inner
                .pipeline
                .request_unit::<()>(Method::DELETE, &format!("{}?force=true", path), None)
                .await?;
            return Ok(None);
        }

        self.api_delete(&path).await.map(Some)
    }

    pub async fn application_status(&self, id: &str) -> Result<ApplicationStatus> {
        let path = format!("/v2/apps/{}", id.trim_start_matches('/'));
        let wrapper: ApplicationWrapper = self.api_get(&path).await?;
        Ok(wrapper.app)
    }

    /// Wait until deployment `id` is gone from the running deployments.
    ///
    /// A zero timeout waits up to [`DEFAULT_DEPLOYMENT_TIMEOUT`].
    pub async fn wait_on_deployment(&self, id: &str, timeout: Duration) -> Result<()> {
        self.wait_on_deployment_until(id, timeout, &CancellationToken::new())
            .await
    }

    /// [`Client::wait_on_deployment`], abandoned early when `stop` fires
    pub async fn wait_on_deployment_until(
        &self,
        id: &str,
        timeout: Duration,
        stop: &CancellationToken,
    ) -> Result<()> {
        if !self.has_deployment(id).await? {
            return Ok(());
        }

        let timeout = if timeout.is_zero() {
            DEFAULT_DEPLOYMENT_TIMEOUT
        } else {
            timeout
        };

        deadline(timeout, stop, |token| async move {
            loop {
                wait::pause(DEPLOYMENT_POLL_INTERVAL, &token).await?;
                if !self.has_deployment(id).await? {
                    debug!("Deployment {} is finished", id);
                    return Ok(());
                }
            }
        })
        .await
    }

    /// Wait until every instance of application `id` is running.
    ///
    /// An application that does not exist yet is waited for.
    pub async fn wait_on_application(&self, id: &str, timeout: Duration) -> Result<()> {
        self.wait_on_application_until(id, timeout, &CancellationToken::new())
            .await
    }

    /// [`Client::wait_on_application`], abandoned early when `stop` fires
    pub async fn wait_on_application_until(
        &self,
        id: &str,
        timeout: Duration,
        stop: &CancellationToken,
    ) -> Result<()> {
        deadline(timeout, stop, |token| async move {
            loop {
                match self.application_status(id).await {
                    Ok(app) if app.all_tasks_running() => return Ok(()),
                    Ok(app) => debug!(
                        "Application {} has {}/{} task(s) running",
                        id, app.tasks_running, app.instances
                    ),
                    Err(Error::DoesNotExist(_)) => debug!("Application {} does not exist yet", id),
                    Err(e) => debug!("Failed to get the status of {}: {}", id, e),
                }
                wait::pause(APPLICATION_POLL_INTERVAL, &token).await?;
            }
        })
        .await
    }
}
