// Service Prober
// Rounds of bounded-concurrency reachability attempts with exponential
// backoff between rounds. Fan-out is capped by a semaphore: flooding a
// constrained embedded target with simultaneous connects can itself trigger
// rate limiting or resource exhaustion.

use crate::domain::probe::ProbeResult;
use crate::domain::settings::Settings;
use crate::domain::target::Target;
use crate::port::prober::PortProber;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Deadline elapsed before every requested port became reachable. Carries
/// the final per-port status so partial success is reported, not erased;
/// whether partial success fails the run is the orchestrator's call.
#[derive(Error, Debug)]
#[error("not all service ports came up within {waited:?}")]
pub struct TimeoutError {
    pub waited: Duration,
    /// Latest result per port at the deadline, ascending by port.
    pub ports: Vec<ProbeResult>,
}

/// Drives the `PortProber` capability across ports and rounds.
pub struct ServiceProber {
    prober: Arc<dyn PortProber>,
    settings: Settings,
}

impl ServiceProber {
    pub fn new(prober: Arc<dyn PortProber>, settings: Settings) -> Self {
        Self { prober, settings }
    }

    /// One probe round: a concurrent attempt per port, never more than
    /// `max_concurrency` in flight. Each attempt has an independent
    /// `connect_timeout`; the whole round is additionally bounded by
    /// `timeout`, with attempts still pending at that deadline reported
    /// unreachable at zero latency. Results are sorted ascending by port.
    pub async fn probe_once(&self, target: &Target) -> Vec<ProbeResult> {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency));
        let round_deadline = Instant::now() + self.settings.timeout;
        let mut attempts: JoinSet<ProbeResult> = JoinSet::new();

        for &port in target.service_ports() {
            let prober = Arc::clone(&self.prober);
            let semaphore = Arc::clone(&semaphore);
            let host = target.host().to_string();
            let attempt_timeout = self.settings.connect_timeout;
            attempts.spawn(async move {
                let permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return ProbeResult::unreachable(
                            port,
                            Duration::ZERO,
                            "probe pool closed",
                        )
                    }
                };
                let result = prober.probe(&host, port, attempt_timeout).await;
                drop(permit);
                result
            });
        }

        let mut results: BTreeMap<u16, ProbeResult> = BTreeMap::new();
        loop {
            tokio::select! {
                joined = attempts.join_next() => match joined {
                    Some(Ok(result)) => {
                        results.insert(result.port, result);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Probe attempt task failed");
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(round_deadline) => {
                    debug!("Round deadline elapsed with attempts still pending");
                    attempts.abort_all();
                    break;
                }
            }
        }

        // Attempts cut off by the deadline never produced a measured
        // latency; zero marks "no completed attempt" rather than inventing
        // a duration.
        for &port in target.service_ports() {
            results.entry(port).or_insert_with(|| {
                ProbeResult::unreachable(port, Duration::ZERO, "round deadline elapsed")
            });
        }
        results.into_values().collect()
    }

    /// Repeat probe rounds until all requested ports report reachable or
    /// `max_service_wait` elapses. Later rounds supersede earlier results
    /// per port. Inter-round delay is `min(base * 2^round, cap)` with ±20%
    /// jitter to avoid thundering-herd re-probing across many targets.
    pub async fn wait_until_ready(
        &self,
        target: &Target,
    ) -> Result<Vec<ProbeResult>, TimeoutError> {
        let started = Instant::now();
        let wait_deadline = started + self.settings.max_service_wait;
        let total = target.service_ports().len();
        let mut latest: BTreeMap<u16, ProbeResult> = BTreeMap::new();
        let mut round: u32 = 0;

        loop {
            for result in self.probe_once(target).await {
                latest.insert(result.port, result);
            }

            let reachable = latest.values().filter(|r| r.reachable).count();
            if reachable == total {
                info!(
                    rounds = round + 1,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "All service ports reachable"
                );
                return Ok(latest.into_values().collect());
            }

            if Instant::now() >= wait_deadline {
                warn!(
                    reachable,
                    total,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Service wait deadline exceeded"
                );
                return Err(TimeoutError {
                    waited: started.elapsed(),
                    ports: latest.into_values().collect(),
                });
            }

            let delay = backoff_delay(
                round,
                self.settings.probe_base_delay,
                self.settings.probe_delay_cap,
            );
            debug!(
                round,
                reachable,
                total,
                delay_ms = delay.as_millis() as u64,
                "Scheduling next probe round"
            );
            // Never sleep past the deadline; the final round runs at most
            // once more before the timeout is reported.
            tokio::time::sleep_until((Instant::now() + delay).min(wait_deadline)).await;
            round = round.saturating_add(1);
        }
    }
}

/// Inter-round delay: `min(base * 2^round, cap)`, jittered by ±20%.
fn backoff_delay(round: u32, base: Duration, cap: Duration) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(round));
    let capped = exponential.min(cap);
    let jitter = rand::thread_rng().gen_range(0.8..=1.2);
    capped.mul_f64(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::prober::mocks::MockPortProber;

    fn settings() -> Settings {
        Settings::standard()
            .builder()
            .timeout(Duration::from_secs(2))
            .connect_timeout(Duration::from_millis(200))
            .max_service_wait(Duration::from_secs(2))
            .probe_base_delay(Duration::from_millis(10))
            .probe_delay_cap(Duration::from_millis(40))
            .build()
            .unwrap()
    }

    fn target(ports: impl IntoIterator<Item = u16>) -> Target {
        Target::new("198.51.100.7", ports, None).unwrap()
    }

    #[tokio::test]
    async fn test_probe_once_results_sorted_by_port() {
        let prober = Arc::new(MockPortProber::new([22, 21]));
        let service = ServiceProber::new(prober, settings());

        let results = service.probe_once(&target([23, 21, 22])).await;
        let ports: Vec<u16> = results.iter().map(|r| r.port).collect();
        assert_eq!(ports, vec![21, 22, 23]);
        assert!(results[0].reachable);
        assert!(results[1].reachable);
        assert!(!results[2].reachable);
    }

    #[tokio::test]
    async fn test_probe_once_honors_concurrency_bound() {
        let prober = Arc::new(
            MockPortProber::new(7000..7024).with_delay(Duration::from_millis(20)),
        );
        let settings = settings().builder().max_concurrency(3).build().unwrap();
        let service = ServiceProber::new(Arc::clone(&prober) as Arc<dyn PortProber>, settings);

        service.probe_once(&target(7000..7024)).await;
        assert!(
            prober.max_in_flight() <= 3,
            "observed {} in-flight probes",
            prober.max_in_flight()
        );
        assert_eq!(prober.probe_count(), 24);
    }

    #[tokio::test]
    async fn test_round_deadline_reports_pending_ports_unreachable() {
        // Unreachable ports hang for the full connect timeout, which is
        // longer than the round deadline.
        let prober = Arc::new(
            MockPortProber::new([22]).with_hanging_unreachable(),
        );
        let settings = settings()
            .builder()
            .timeout(Duration::from_millis(50))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let service = ServiceProber::new(prober, settings);

        let started = std::time::Instant::now();
        let results = service.probe_once(&target([21, 22])).await;
        assert!(started.elapsed() < Duration::from_secs(1));

        assert_eq!(results.len(), 2);
        assert!(!results[0].reachable);
        assert!(results[0].error.as_deref().unwrap().contains("deadline"));
        // No attempt completed for the pending port, so no latency is
        // reported for it.
        assert_eq!(results[0].latency, Duration::ZERO);
        assert!(results[1].reachable);
    }

    #[tokio::test]
    async fn test_wait_until_ready_succeeds_when_port_opens_later() {
        let prober = Arc::new(MockPortProber::new([22, 23]));
        let service =
            ServiceProber::new(Arc::clone(&prober) as Arc<dyn PortProber>, settings());

        let opener = Arc::clone(&prober);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            opener.open_port(21);
        });

        let results = service
            .wait_until_ready(&target([21, 22, 23]))
            .await
            .expect("ports should all come up");
        assert!(results.iter().all(|r| r.reachable));
    }

    #[tokio::test]
    async fn test_wait_until_ready_times_out_with_partial_status() {
        let prober = Arc::new(MockPortProber::new([23]));
        let settings = settings()
            .builder()
            .max_service_wait(Duration::from_millis(120))
            .build()
            .unwrap();
        let service = ServiceProber::new(prober, settings);

        let err = service
            .wait_until_ready(&target([21, 22, 23]))
            .await
            .expect_err("deadline should elapse");
        assert!(err.waited >= Duration::from_millis(120));
        let reachable: Vec<u16> = err
            .ports
            .iter()
            .filter(|r| r.reachable)
            .map(|r| r.port)
            .collect();
        assert_eq!(reachable, vec![23]);
    }

    #[test]
    fn test_backoff_delay_grows_and_caps() {
        let base = Duration::from_millis(100);
        let cap = Duration::from_millis(500);
        for round in 0..8 {
            let delay = backoff_delay(round, base, cap);
            let nominal = base.saturating_mul(2u32.saturating_pow(round)).min(cap);
            assert!(delay >= nominal.mul_f64(0.8));
            assert!(delay <= nominal.mul_f64(1.2));
        }
    }
}
