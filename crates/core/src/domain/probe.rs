// Probe Result Value Type

use std::time::Duration;

/// Outcome of a single reachability attempt against one service port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub port: u16,
    pub reachable: bool,
    /// Time from attempt start to connect success or failure.
    pub latency: Duration,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn reachable(port: u16, latency: Duration) -> Self {
        Self {
            port,
            reachable: true,
            latency,
            error: None,
        }
    }

    pub fn unreachable(port: u16, latency: Duration, error: impl Into<String>) -> Self {
        Self {
            port,
            reachable: false,
            latency,
            error: Some(error.into()),
        }
    }
}
