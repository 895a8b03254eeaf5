//! Recovery probing for unavailable members
//!
//! When a member is marked down the ring spawns one background task per
//! member that pings it until it answers again. The loop mirrors a heartbeat:
//! probe, sleep, repeat, and exit early when the shutdown token fires.

use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Path probed on a member to decide whether it is back
pub const PING_PATH: &str = "/ping";

/// Configuration for recovery probes
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Delay between two probes of the same member
    pub interval: Duration,
    /// Timeout of a single probe request
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
        }
    }
}

impl ProbeConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Probe a member once; only an HTTP 200 counts as healthy
pub async fn probe_member(client: &Client, member_url: &str) -> bool {
    let url = format!("{}{}", member_url.trim_end_matches('/'), PING_PATH);

    match client.get(&url).send().await {
        Ok(response) => {
            let healthy = response.status() == reqwest::StatusCode::OK;
            trace!("Probe {} returned {}", url, response.status());
            healthy
        }
        Err(e) => {
            trace!("Probe {} failed: {}", url, e);
            false
        }
    }
}

/// Probe `member_url` until it is healthy.
///
/// Returns `true` once a probe succeeds and `false` if `shutdown` fires
/// first. There is no attempt limit.
pub async fn wait_until_healthy(
    client: &Client,
    member_url: &str,
    interval: Duration,
    shutdown: &CancellationToken,
) -> bool {
    let mut attempts = 0u64;

    loop {
        attempts += 1;

        tokio::select! {
            healthy = probe_member(client, member_url) => {
                if healthy {
                    debug!("Member {} answered after {} probe(s)", member_url, attempts);
                    return true;
                }
            }
            _ = shutdown.cancelled() => return false,
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.cancelled() => return false,
        }
    }
}
