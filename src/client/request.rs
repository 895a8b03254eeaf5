//! Request pipeline
//!
//! Every API call goes through [`Pipeline::execute`]: pick a member from the
//! endpoint ring, send, and on a transport failure mark the member down and
//! try the next one. A call never visits more members than the ring holds.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::error::{Error, Result};
use crate::cluster::{EndpointRing, ProbeConfig};
use crate::config::Config;

const JSON: &str = "application/json";
const EVENT_STREAM: &str = "text/event-stream";

/// Status and body of a successful call
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// Sends API calls to the Marathon cluster with member failover
pub struct Pipeline {
    ring: EndpointRing,
    http: reqwest::Client,
    stream_http: reqwest::Client,
    basic_auth: Option<(String, Option<String>)>,
}

impl Pipeline {
    pub fn new(config: &Config) -> Result<Self> {
        let probe = ProbeConfig::default().with_interval(config.probe_interval());
        let ring = EndpointRing::new(&config.url, probe)?;

        let mut http = reqwest::Client::builder();
        let mut stream_http = reqwest::Client::builder();
        if config.request_timeout_secs > 0 {
            http = http.timeout(config.request_timeout());
            // the event stream never completes, only the connect is bounded
            stream_http = stream_http.connect_timeout(config.request_timeout());
        }

        let basic_auth = config
            .basic_auth_user
            .clone()
            .map(|user| (user, config.basic_auth_password.clone()));

        Ok(Self {
            ring,
            http: http.build()?,
            stream_http: stream_http.build()?,
            basic_auth,
        })
    }

    pub fn ring(&self) -> &EndpointRing {
        &self.ring
    }

    /// Perform a call with a pre-encoded JSON body.
    ///
    /// Non-2xx responses are mapped through [`Error::from_status`] and never
    /// retried.
    pub async fn execute(&self, method: Method, path: &str, body: Option<String>) -> Result<RawResponse> {
        let response = self.send(&self.http, method, path, body, JSON).await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        if !status.is_success() {
            return Err(Error::from_status(status, &String::from_utf8_lossy(&body)));
        }

        Ok(RawResponse { status, body })
    }

    /// Perform a call, encoding `body` and decoding the response
    pub async fn request<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = body.map(serde_json::to_string).transpose()?;
        let response = self.execute(method, path, body).await?;

        serde_json::from_slice(&response.body)
            .map_err(|e| Error::InvalidResponse(format!("failed to decode the response of {}: {}", path, e)))
    }

    /// Perform a call whose response body is of no interest
    pub async fn request_unit<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let body = body.map(serde_json::to_string).transpose()?;
        self.execute(method, path, body).await.map(|_| ())
    }

    /// GET `path` and decode the response
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request::<(), T>(Method::GET, path, None).await
    }

    /// Open a long-lived server-sent event stream
    pub async fn open_stream(&self, path: &str) -> Result<Response> {
        let response = self.send(&self.stream_http, Method::GET, path, None, EVENT_STREAM).await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status, &body));
        }

        Ok(response)
    }

    async fn send(
        &self,
        http: &reqwest::Client,
        method: Method,
        path: &str,
        body: Option<String>,
        accept: &str,
    ) -> Result<Response> {
        for _ in 0..self.ring.size() {
            let member = self.ring.next().await?;
            let url = format!("{}{}", member, path);

            let mut request = http.request(method.clone(), &url).header(ACCEPT, accept);
            if let Some(body) = &body {
                request = request.header(CONTENT_TYPE, JSON).body(body.clone());
            }
            if let Some((user, password)) = &self.basic_auth {
                request = request.basic_auth(user, password.as_ref());
            }

            debug!("{} {}", method, url);

            match request.send().await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_builder() => return Err(Error::Http(e)),
                Err(e) => {
                    warn!("Request to {} failed, trying the next member: {}", url, e);
                    self.ring.mark_down(&member).await;
                }
            }
        }

        Err(Error::MarathonDown)
    }
}
