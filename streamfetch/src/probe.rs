use log::debug;
use std::time::Duration;
use ureq::Agent;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connectivity check gating whether a fetcher job is even attempted for a
/// candidate URL. The check blocks the calling thread for the full network
/// round trip.
pub trait ReachabilityProbe: Send + Sync {
    /// true iff the URL currently accepts connections and answers with a
    /// success-class status in [200, 300).
    fn check(&self, url: &str) -> bool;
}

pub struct HttpProbe {
    agent: Agent,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        // Non-2xx answers must reach the status check instead of surfacing
        // as transport errors.
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl ReachabilityProbe for HttpProbe {
    fn check(&self, url: &str) -> bool {
        match self.agent.get(url).call() {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("probe request to {} failed: {}", url, e);
                false
            }
        }
    }
}

#[cfg(test)]
pub use fake::FakeProbe;
