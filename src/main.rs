//! statsd-fanout daemon entry point.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info};
use tokio::signal;
use tokio::signal::unix::{signal as unix_signal, SignalKind};

use statsd_fanout::{
    system_resolver, Config, DefaultTransportFactory, DnsValidator, Endpoint, MetricRegistry,
    ReporterRegistry,
};

/// How often the daemon refreshes its own gauges.
const SELF_METRICS_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting statsd-fanout with config: {:?}", cfg);

    // One resolver for validation and delivery
    let resolver = system_resolver(cfg.dns_timeout());

    let metrics = MetricRegistry::new();
    let registry = Arc::new(
        ReporterRegistry::new(
            Arc::new(metrics.clone()),
            Arc::new(DnsValidator::with_resolver(resolver.clone())),
            Arc::new(DefaultTransportFactory::new(resolver, cfg.dns_timeout())),
        )
        .with_interval(cfg.flush_interval()),
    );

    reconcile(&registry, &metrics, &cfg.endpoints).await;

    // Self metrics
    let registry_for_metrics = Arc::clone(&registry);
    let metrics_for_task = metrics.clone();
    let metrics_handle = tokio::spawn(async move {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(SELF_METRICS_INTERVAL);
        loop {
            ticker.tick().await;
            metrics_for_task
                .set_gauge("statsd_fanout.uptime_secs", started.elapsed().as_secs_f64());
            metrics_for_task.set_gauge(
                "statsd_fanout.reporters.active",
                registry_for_metrics.len().await as f64,
            );
        }
    });

    // Reload on SIGHUP
    let registry_for_reload = Arc::clone(&registry);
    let metrics_for_reload = metrics.clone();
    let reload_handle = tokio::spawn(async move {
        let mut hangup = match unix_signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                error!("Unable to listen for SIGHUP, reload disabled: {}", e);
                return;
            }
        };
        while hangup.recv().await.is_some() {
            info!("Received SIGHUP, reloading endpoints...");
            match Config::load() {
                Ok(cfg) => {
                    reconcile(&registry_for_reload, &metrics_for_reload, &cfg.endpoints).await
                }
                Err(e) => error!("Keeping current endpoints: {}", e),
            }
        }
    });

    // Graceful Shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    reload_handle.abort();
    metrics_handle.abort();
    registry.stop_all().await;

    info!("Shutdown complete.");
    Ok(())
}

async fn reconcile(
    registry: &ReporterRegistry,
    metrics: &MetricRegistry,
    endpoints: &[Endpoint],
) {
    let summary = registry.update(endpoints).await;
    metrics.increment("statsd_fanout.reconcile.count", 1);
    info!(
        "Reconciled {} endpoints: {} started, {} kept, {} skipped, {} stopped",
        endpoints.len(),
        summary.started,
        summary.retained,
        summary.skipped,
        summary.stopped
    );
}
