//! Readiness probe for network-addressable dependencies.
//!
//! A service is ready once it accepts a TCP connection on its primary
//! port, or on its secondary port when the primary one refuses. Refused
//! and timed-out connections both simply mean "not ready yet".

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Per-attempt connection timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Delay between readiness polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Polls between "still waiting" progress lines.
const PROGRESS_EVERY: u32 = 10;

/// Address information used to probe a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// Host name or IP address.
    pub host: String,
    /// Port probed first.
    pub primary_port: u16,
    /// Port probed when the primary one is not accepting.
    pub secondary_port: Option<u16>,
}

impl ServiceEndpoint {
    /// Build an endpoint from the service configuration.
    #[must_use]
    pub fn from_config(service: &crate::config::ServiceConfig) -> Self {
        Self {
            host: service.host.clone(),
            primary_port: service.port,
            secondary_port: service.secondary_port,
        }
    }
}

/// Check whether `endpoint` accepts connections right now.
///
/// Never blocks longer than two connection attempts of [`CONNECT_TIMEOUT`].
pub async fn is_ready(endpoint: &ServiceEndpoint) -> bool {
    if accepts(&endpoint.host, endpoint.primary_port).await {
        return true;
    }
    match endpoint.secondary_port {
        Some(port) => accepts(&endpoint.host, port).await,
        None => false,
    }
}

/// Poll [`is_ready`] once per second until it succeeds, `timeout`
/// elapses, or `cancel` fires. Each attempt is cut short at the deadline.
///
/// Returns `false` on timeout and on cancellation; callers distinguish the
/// two through the token.
pub async fn wait_until_ready(
    endpoint: &ServiceEndpoint,
    timeout: Duration,
    cancel: &CancellationToken,
) -> bool {
    let started = Instant::now();
    let deadline = started + timeout;
    let mut polls: u32 = 0;

    info!(
        host = endpoint.host,
        port = endpoint.primary_port,
        timeout_secs = timeout.as_secs(),
        "waiting for service readiness"
    );

    loop {
        // A hanging connect must not carry the wait past its deadline.
        let remaining = deadline.saturating_duration_since(Instant::now());
        let ready = tokio::time::timeout(remaining, is_ready(endpoint))
            .await
            .unwrap_or(false);
        if ready {
            info!(
                elapsed_secs = started.elapsed().as_secs(),
                "service is ready"
            );
            return true;
        }

        let now = Instant::now();
        if now >= deadline {
            info!(
                timeout_secs = timeout.as_secs(),
                "service not ready within timeout"
            );
            return false;
        }

        let pause = POLL_INTERVAL.min(deadline - now);
        tokio::select! {
            () = cancel.cancelled() => {
                info!("readiness wait cancelled");
                return false;
            }
            () = tokio::time::sleep(pause) => {}
        }

        polls += 1;
        if polls % PROGRESS_EVERY == 0 {
            info!(
                elapsed_secs = started.elapsed().as_secs(),
                "still waiting for service"
            );
        }
    }
}

async fn accepts(host: &str, port: u16) -> bool {
    match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(err)) => {
            debug!(host, port, %err, "probe connection failed");
            false
        }
        Err(_elapsed) => {
            debug!(host, port, "probe connection timed out");
            false
        }
    }
}
