use std::sync::Arc;
use std::time::Duration;

use statsd_fanout::{
    system_resolver, DefaultTransportFactory, DnsValidator, Endpoint, MetricRegistry,
    PrefixFilter, ReporterRegistry, Tag,
};
use tokio::net::UdpSocket;

fn registry(metrics: &MetricRegistry) -> ReporterRegistry {
    let timeout = Duration::from_millis(500);
    let resolver = system_resolver(timeout);
    ReporterRegistry::new(
        Arc::new(metrics.clone()),
        Arc::new(DnsValidator::with_resolver(resolver.clone())),
        Arc::new(DefaultTransportFactory::new(resolver, timeout)),
    )
}

#[tokio::test]
async fn two_valid_endpoints_start_two_reporters() {
    let registry = registry(&MetricRegistry::new());

    registry
        .update(&[
            Endpoint::udp("localhost", 8125),
            Endpoint::udp("localhost", 18125),
        ])
        .await;

    assert_eq!(registry.len().await, 2);
    registry.stop_all().await;
}

#[tokio::test]
async fn invalid_endpoint_never_becomes_active() {
    let registry = registry(&MetricRegistry::new());
    let valid = Endpoint::udp("localhost", 8125);
    let invalid = Endpoint::udp("invalid-host.invalid", 999999);

    let summary = registry.update(&[valid.clone(), invalid.clone()]).await;

    assert_eq!(summary.started, 1);
    assert_eq!(summary.skipped, 1);
    let reporters = registry.reporters().await;
    assert_eq!(reporters.len(), 1);
    assert!(reporters.contains_key(&valid));
    assert!(!reporters.contains_key(&invalid));
    registry.stop_all().await;
}

#[tokio::test]
async fn reconfiguration_keeps_unchanged_reporters() {
    let registry = registry(&MetricRegistry::new());
    let a = Endpoint::udp("localhost", 8125);
    let b = Endpoint::udp("localhost", 18125);

    registry.update(&[a.clone(), b.clone()]).await;
    let first = registry.reporters().await;

    let summary = registry.update(&[a.clone(), b.clone()]).await;
    assert!(summary.is_noop());
    assert_eq!(registry.reporters().await, first);

    let summary = registry.update(&[a.clone()]).await;
    assert_eq!(summary.stopped, 1);
    let reporters = registry.reporters().await;
    assert_eq!(reporters.len(), 1);
    assert_eq!(reporters[&a], first[&a]);

    registry.stop_all().await;
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn pushes_filtered_tagged_metrics_over_udp() {
    let collector = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = collector.local_addr().unwrap().port();

    let metrics = MetricRegistry::new();
    metrics.increment("jobs.completed", 3);
    metrics.set_gauge("vm.heap", 64.0);
    metrics.record("jobs.duration", 1.0);

    let registry = registry(&metrics).with_interval(Duration::from_millis(50));
    let endpoint = Endpoint::udp("127.0.0.1", i64::from(port))
        .with_tags(vec![Tag::new("env", "test")])
        .with_prefix_filters(vec![PrefixFilter::new("jobs.")]);
    registry.update(&[endpoint]).await;

    let mut buf = [0u8; 2048];
    let n = tokio::time::timeout(Duration::from_secs(5), collector.recv(&mut buf))
        .await
        .expect("collector should receive a flush")
        .unwrap();
    registry.stop_all().await;

    let payload = std::str::from_utf8(&buf[..n]).unwrap();
    let lines: Vec<&str> = payload.lines().collect();
    assert_eq!(
        lines,
        vec![
            "jobs.completed:3|g|#env:test",
            "jobs.duration.count:1|g|#env:test",
        ]
    );
}

