// Parallel collection: partial failure, concurrency bound, timeouts, topology

mod common;

use common::{FakeContainer, FakeRuntime};
use logique::collector::Collector;
use logique::models::ContainerStatus;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn five_containers() -> FakeRuntime {
    (1..=5).fold(FakeRuntime::new(), |rt, i| {
        rt.with_container(FakeContainer::running(&format!("c{}", i), &format!("svc{}", i)))
    })
}

#[tokio::test]
async fn one_failed_inspect_omits_only_that_container() {
    let rt = Arc::new(five_containers());
    rt.fail_inspect("c3");
    let collector = Collector::new(rt.clone(), 8, Duration::from_secs(1));

    let snapshots = collector.collect_all().await.unwrap();

    let names: HashSet<String> = snapshots.iter().map(|s| s.name.clone()).collect();
    assert_eq!(snapshots.len(), 4);
    assert!(!names.contains("svc3"));
    assert!(names.contains("svc1") && names.contains("svc5"));
}

#[tokio::test]
async fn concurrency_never_exceeds_max_workers() {
    let rt = Arc::new(five_containers());
    let collector = Collector::new(rt.clone(), 2, Duration::from_secs(1));

    let snapshots = collector.collect_all().await.unwrap();

    assert_eq!(snapshots.len(), 5);
    let peak = rt.max_in_flight.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 2, "peak in-flight was {}", peak);
}

#[tokio::test]
async fn running_containers_get_metrics_and_stopped_ones_do_not() {
    let rt = Arc::new(
        FakeRuntime::new()
            .with_container(FakeContainer::running("up", "web"))
            .with_container(FakeContainer::stopped("down", "batch")),
    );
    let collector = Collector::new(rt.clone(), 4, Duration::from_secs(1));

    let up = collector.snapshot("up").await.unwrap();
    let down = collector.snapshot("down").await.unwrap();

    assert_eq!(up.status, ContainerStatus::Running);
    assert!((up.metrics.cpu_percent - 20.0).abs() < 0.01);
    assert_eq!(up.metrics.memory_percent, 50.0);
    assert!(up.uptime_seconds > 0);
    assert_eq!(up.short_id.len(), 12);
    assert_eq!(up.image, "web:latest");

    assert_eq!(down.status, ContainerStatus::Exited);
    assert_eq!(down.metrics.cpu_percent, 0.0);
    assert_eq!(down.uptime_seconds, 0);
    assert_eq!(rt.usage_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn slow_usage_snapshot_zero_fills_metrics() {
    let rt = Arc::new(FakeRuntime::new().with_container(FakeContainer::running("slow", "db")));
    rt.set_usage_delay(Duration::from_millis(500));
    let collector = Collector::new(rt.clone(), 4, Duration::from_millis(50));

    let snap = collector.snapshot("slow").await.unwrap();

    assert_eq!(snap.name, "db");
    assert_eq!(snap.metrics.cpu_percent, 0.0);
    assert_eq!(snap.metrics.memory_usage_bytes, 0);
}

#[tokio::test]
async fn unknown_container_is_not_found() {
    let rt = Arc::new(FakeRuntime::new());
    let collector = Collector::new(rt, 4, Duration::from_secs(1));
    let err = collector.detail("ghost").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn topology_buckets_members_sorted_with_bare_ips() {
    let rt = Arc::new(
        FakeRuntime::new()
            .with_network("backend")
            .with_network("empty")
            .with_container(FakeContainer::running("b", "worker").on("backend", "172.18.0.3/16"))
            .with_container(FakeContainer::running("a", "api").on("backend", "172.18.0.2"))
            .with_container(FakeContainer::running("x", "stray").on("unlisted", "10.0.0.9")),
    );
    let collector = Collector::new(rt, 4, Duration::from_secs(1));

    let topology = collector.network_topology().await.unwrap();

    assert_eq!(topology.len(), 2);
    let backend = &topology["backend"];
    let members: Vec<(&str, &str)> = backend
        .containers
        .iter()
        .map(|c| (c.name.as_str(), c.ip_address.as_str()))
        .collect();
    assert_eq!(members, [("api", "172.18.0.2"), ("worker", "172.18.0.3")]);
    assert!(topology["empty"].containers.is_empty());
}
