//! Behavioral properties of the service prober: bounded fan-out, deadline
//! discipline, and partial-status reporting under load.

use std::sync::Arc;
use std::time::Duration;

use provisor_core::application::ServiceProber;
use provisor_core::domain::{Settings, Target};
use provisor_core::port::prober::mocks::MockPortProber;
use provisor_core::port::prober::PortProber;

fn settings() -> Settings {
    Settings::standard()
        .builder()
        .timeout(Duration::from_secs(2))
        .connect_timeout(Duration::from_millis(200))
        .max_service_wait(Duration::from_secs(3))
        .probe_base_delay(Duration::from_millis(10))
        .probe_delay_cap(Duration::from_millis(50))
        .build()
        .unwrap()
}

fn target(ports: impl IntoIterator<Item = u16>) -> Target {
    Target::new("203.0.113.5", ports, None).unwrap()
}

/// Many ports, slow probes: in-flight attempts never exceed the configured
/// bound even across several rounds.
#[tokio::test]
async fn test_fan_out_never_exceeds_concurrency_bound() {
    let prober = Arc::new(
        MockPortProber::new(9000..9064).with_delay(Duration::from_millis(15)),
    );
    let settings = settings().builder().max_concurrency(4).build().unwrap();
    let service = ServiceProber::new(Arc::clone(&prober) as Arc<dyn PortProber>, settings);

    let results = service
        .wait_until_ready(&target(9000..9064))
        .await
        .expect("all ports open");

    assert_eq!(results.len(), 64);
    assert!(results.iter().all(|r| r.reachable));
    assert!(
        prober.max_in_flight() <= 4,
        "observed {} in-flight probes",
        prober.max_in_flight()
    );
}

/// With no port ever opening, the wait terminates close to
/// `max_service_wait`: never early, and never more than one extra round
/// late. Paused time keeps the 180s wall clock virtual.
#[tokio::test(start_paused = true)]
async fn test_wait_terminates_within_deadline_plus_one_round() {
    let prober = Arc::new(MockPortProber::new([]).with_hanging_unreachable());
    let settings = Settings::standard()
        .builder()
        .timeout(Duration::from_secs(5))
        .connect_timeout(Duration::from_secs(5))
        .max_service_wait(Duration::from_secs(180))
        .build()
        .unwrap();
    let service = ServiceProber::new(prober, settings);

    let started = tokio::time::Instant::now();
    let err = service
        .wait_until_ready(&target([21, 22, 23]))
        .await
        .expect_err("nothing ever opens");

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(180), "stopped early: {elapsed:?}");
    // At worst the deadline lands just after a round starts; that round
    // still runs to its own 5s bound.
    assert!(elapsed <= Duration::from_secs(186), "overran: {elapsed:?}");
    assert!(err.waited >= Duration::from_secs(180));
    assert_eq!(err.ports.len(), 3);
}

/// A port opening mid-wait flips its result in a later round; earlier
/// failures for that port are superseded, not accumulated.
#[tokio::test]
async fn test_late_opening_port_supersedes_earlier_failure() {
    let prober = Arc::new(MockPortProber::new([22]));
    let service = ServiceProber::new(Arc::clone(&prober) as Arc<dyn PortProber>, settings());

    let opener = Arc::clone(&prober);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        opener.open_port(23);
        tokio::time::sleep(Duration::from_millis(40)).await;
        opener.open_port(21);
    });

    let results = service
        .wait_until_ready(&target([21, 22, 23]))
        .await
        .expect("all ports eventually open");

    let ports: Vec<u16> = results.iter().map(|r| r.port).collect();
    assert_eq!(ports, vec![21, 22, 23]);
    assert!(results.iter().all(|r| r.reachable));
    // Ports 21 and 23 needed at least one failed round first.
    assert!(prober.probe_count() > 3);
}

/// Timeout reports the latest status of every requested port, reachable
/// ones included.
#[tokio::test]
async fn test_timeout_carries_latest_status_for_every_port() {
    let prober = Arc::new(MockPortProber::new([22, 23]));
    let settings = settings()
        .builder()
        .max_service_wait(Duration::from_millis(100))
        .build()
        .unwrap();
    let service = ServiceProber::new(prober, settings);

    let err = service
        .wait_until_ready(&target([21, 22, 23]))
        .await
        .expect_err("port 21 never opens");

    assert_eq!(err.ports.len(), 3);
    let reachable: Vec<u16> = err
        .ports
        .iter()
        .filter(|r| r.reachable)
        .map(|r| r.port)
        .collect();
    assert_eq!(reachable, vec![22, 23]);
    let unreachable = err.ports.iter().find(|r| r.port == 21).unwrap();
    assert!(unreachable.error.is_some());
}
