//! Endpoint ring - the set of Marathon hosts a client may talk to
//!
//! Members are kept in an indexed vector with a separate cursor. `next()`
//! walks the ring from the cursor and hands out the first available member;
//! `mark_down()` takes a member out of rotation and starts a recovery probe
//! that puts it back once `/ping` answers again.

use std::sync::Arc;

use reqwest::{Client, Url};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::probe::{wait_until_healthy, ProbeConfig};

/// Errors raised by the endpoint ring
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("invalid Marathon endpoint specified: {0}")]
    InvalidEndpoint(String),

    #[error("no cluster members available at the moment")]
    NoMembersAvailable,
}

/// Availability of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Available,
    Unavailable,
}

/// One candidate Marathon host
#[derive(Debug, Clone)]
pub struct Member {
    /// `host[:port]` as configured
    pub host: String,
    pub status: MemberStatus,
}

#[derive(Debug)]
struct RingState {
    members: Vec<Member>,
    cursor: usize,
}

/// Ordered, circular set of Marathon members.
///
/// Membership is fixed at construction. Dropping the ring stops every
/// outstanding recovery probe.
pub struct EndpointRing {
    url: String,
    scheme: String,
    path: String,
    size: usize,
    state: Arc<RwLock<RingState>>,
    probe: ProbeConfig,
    probe_client: Client,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for EndpointRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRing")
            .field("url", &self.url)
            .field("size", &self.size)
            .finish()
    }
}

impl EndpointRing {
    /// Build a ring from a Marathon URL such as
    /// `http://10.0.0.1:8080,10.0.0.2:8080/prefix`.
    pub fn new(url: &str, probe: ProbeConfig) -> Result<Self, ClusterError> {
        let (scheme, hosts, path) = parse_endpoint(url)?;

        let probe_client = Client::builder()
            .timeout(probe.timeout)
            .build()
            .map_err(|e| ClusterError::InvalidEndpoint(e.to_string()))?;

        let members: Vec<Member> = hosts
            .into_iter()
            .map(|host| Member {
                host,
                status: MemberStatus::Available,
            })
            .collect();

        debug!("Created endpoint ring for {} with {} member(s)", url, members.len());

        Ok(Self {
            url: url.to_string(),
            scheme,
            path,
            size: members.len(),
            state: Arc::new(RwLock::new(RingState { members, cursor: 0 })),
            probe,
            probe_client,
            shutdown: CancellationToken::new(),
        })
    }

    /// The URL the ring was built from
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of members
    pub fn size(&self) -> usize {
        self.size
    }

    /// Base URL of the next available member.
    ///
    /// Scans at most one full turn starting at the cursor and moves the cursor
    /// past the member handed out, so successive calls rotate through healthy
    /// members.
    pub async fn next(&self) -> Result<String, ClusterError> {
        let mut state = self.state.write().await;
        let size = state.members.len();

        for offset in 0..size {
            let index = (state.cursor + offset) % size;
            if state.members[index].status == MemberStatus::Available {
                state.cursor = (index + 1) % size;
                return Ok(self.member_url(&state.members[index].host));
            }
        }

        Err(ClusterError::NoMembersAvailable)
    }

    /// Take a member out of rotation and start probing it for recovery.
    ///
    /// `member` is a base URL previously returned by [`EndpointRing::next`].
    /// Must be called from within a tokio runtime.
    pub async fn mark_down(&self, member: &str) {
        let mut state = self.state.write().await;
        let size = state.members.len();

        let Some(index) = state
            .members
            .iter()
            .position(|m| self.member_url(&m.host) == member)
        else {
            debug!("Ignoring mark down of unknown member {}", member);
            return;
        };

        if state.members[index].status == MemberStatus::Unavailable {
            return;
        }

        state.members[index].status = MemberStatus::Unavailable;
        state.cursor = (index + 1) % size;
        warn!("Marked Marathon member {} as down", member);

        self.spawn_recovery(index, member.to_string());
    }

    /// Base URLs of the members currently available
    pub async fn active(&self) -> Vec<String> {
        self.members_with(MemberStatus::Available).await
    }

    /// Base URLs of the members currently marked down
    pub async fn non_active(&self) -> Vec<String> {
        self.members_with(MemberStatus::Unavailable).await
    }

    /// Snapshot of all members in ring order
    pub async fn members(&self) -> Vec<Member> {
        self.state.read().await.members.clone()
    }

    async fn members_with(&self, status: MemberStatus) -> Vec<String> {
        let state = self.state.read().await;
        state
            .members
            .iter()
            .filter(|m| m.status == status)
            .map(|m| self.member_url(&m.host))
            .collect()
    }

    fn member_url(&self, host: &str) -> String {
        format!("{}://{}{}", self.scheme, host, self.path)
    }

    fn spawn_recovery(&self, index: usize, member: String) {
        let state = self.state.clone();
        let client = self.probe_client.clone();
        let interval = self.probe.interval;
        let shutdown = self.shutdown.child_token();

        tokio::spawn(async move {
            if wait_until_healthy(&client, &member, interval, &shutdown).await {
                let mut state = state.write().await;
                state.members[index].status = MemberStatus::Available;
                info!("Marathon member {} is available again", member);
            }
        });
    }
}

impl Drop for EndpointRing {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Split a (possibly multi-host) Marathon URL into scheme, hosts and path
fn parse_endpoint(url: &str) -> Result<(String, Vec<String>, String), ClusterError> {
    let invalid = || ClusterError::InvalidEndpoint(url.to_string());

    let (scheme, rest) = url.trim().split_once("://").ok_or_else(invalid)?;
    let scheme = scheme.to_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(invalid());
    }

    let (authority, path) = match rest.find('/') {
        Some(pos) => (&rest[..pos], rest[pos..].trim_end_matches('/')),
        None => (rest, ""),
    };

    let mut hosts = Vec::new();
    for host in authority.split(',').map(str::trim) {
        if host.is_empty() {
            return Err(invalid());
        }
        // each member must form a valid URL on its own
        Url::parse(&format!("{}://{}", scheme, host)).map_err(|_| invalid())?;
        hosts.push(host.to_string());
    }

    Ok((scheme, hosts, path.to_string()))
}
