// TCP Port Prober
// The single production PortProber implementation: one TCP connect attempt
// under a timeout, latency measured from attempt start.

use async_trait::async_trait;
use provisor_core::domain::probe::ProbeResult;
use provisor_core::port::prober::PortProber;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

pub struct TcpProber;

#[async_trait]
impl PortProber for TcpProber {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> ProbeResult {
        let started = Instant::now();
        match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                // Reachability only; the connection is closed immediately.
                drop(stream);
                ProbeResult::reachable(port, started.elapsed())
            }
            Ok(Err(e)) => ProbeResult::unreachable(port, started.elapsed(), e.to_string()),
            Err(_) => ProbeResult::unreachable(
                port,
                started.elapsed(),
                format!("connect timed out after {timeout:?}"),
            ),
        }
    }
}
