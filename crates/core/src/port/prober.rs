// Port Prober Port (for a single reachability attempt)
// Exactly one production implementation (TcpProber in provisor-infra-net);
// no runtime capability detection. Fan-out, bounding, and backoff live in
// the application layer on top of this trait.

use crate::domain::probe::ProbeResult;
use async_trait::async_trait;
use std::time::Duration;

/// One connection attempt against one port. Must complete within `timeout`
/// and never panic; failures are reported inside the `ProbeResult`.
#[async_trait]
pub trait PortProber: Send + Sync {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> ProbeResult;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock prober with an instrumented in-flight counter, so tests can
    /// assert the concurrency bound is honored.
    pub struct MockPortProber {
        open_ports: Mutex<HashSet<u16>>,
        /// Simulated time to answer for an open port.
        delay: Duration,
        /// Unreachable ports hang until the per-probe timeout when set.
        hang_unreachable: bool,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        probes: AtomicUsize,
    }

    impl MockPortProber {
        pub fn new(open_ports: impl IntoIterator<Item = u16>) -> Self {
            Self {
                open_ports: Mutex::new(open_ports.into_iter().collect()),
                delay: Duration::from_millis(1),
                hang_unreachable: false,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                probes: AtomicUsize::new(0),
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Make unreachable ports consume their full timeout, as a dead
        /// host would.
        pub fn with_hanging_unreachable(mut self) -> Self {
            self.hang_unreachable = true;
            self
        }

        /// Open a port mid-test, simulating a service coming up.
        pub fn open_port(&self, port: u16) {
            self.open_ports.lock().unwrap().insert(port);
        }

        /// Highest number of simultaneously in-flight probes observed.
        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        pub fn probe_count(&self) -> usize {
            self.probes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PortProber for MockPortProber {
        async fn probe(&self, _host: &str, port: u16, timeout: Duration) -> ProbeResult {
            self.probes.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            let open = self.open_ports.lock().unwrap().contains(&port);
            let wait = if open || !self.hang_unreachable {
                self.delay
            } else {
                timeout
            };
            tokio::time::sleep(wait).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if open {
                ProbeResult::reachable(port, wait)
            } else {
                ProbeResult::unreachable(port, wait, "connection refused")
            }
        }
    }
}
