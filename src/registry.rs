//! Reporter registry.
//!
//! The registry owns one running [`Reporter`] per distinct [`Endpoint`]
//! and converges that set onto whatever endpoint list the configuration
//! layer hands it.  Endpoints are compared by value, so an edited
//! endpoint is a new entry: its old reporter is stopped and a fresh one
//! started, instead of mutating a running transport in place.
//!
//! Reconciliation and shutdown serialize on a single lock.  Reporters
//! flush on their own tasks and never take that lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use log::{info, warn};
use tokio::sync::Mutex;

use crate::error::TransportError;
use crate::filter::MetricFilter;
use crate::metrics::{Expansion, MetricSource};
use crate::reporter::{Reporter, ReporterId};
use crate::transport::TransportFactory;
use crate::types::Endpoint;
use crate::validator::EndpointValidator;

/// Flush interval used unless the host overrides it.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Histogram expansions every reporter is built with.
const EXPANSIONS: [Expansion; 1] = [Expansion::Count];

/// What one reconciliation pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    /// Reporters started for endpoints that were not running.
    pub started: usize,
    /// Desired endpoints whose reporter was already running.
    pub retained: usize,
    /// Desired endpoints left out because they are invalid or unsupported.
    pub skipped: usize,
    /// Reporters stopped because their endpoint is no longer desired.
    pub stopped: usize,
}

impl Reconciliation {
    /// True when the pass neither started nor stopped anything.
    pub fn is_noop(&self) -> bool {
        self.started == 0 && self.stopped == 0
    }
}

pub struct ReporterRegistry {
    active: Mutex<HashMap<Endpoint, Reporter>>,
    source: Arc<dyn MetricSource>,
    validator: Arc<dyn EndpointValidator>,
    factory: Arc<dyn TransportFactory>,
    interval: Duration,
}

impl ReporterRegistry {
    pub fn new(
        source: Arc<dyn MetricSource>,
        validator: Arc<dyn EndpointValidator>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            source,
            validator,
            factory,
            interval: DEFAULT_FLUSH_INTERVAL,
        }
    }

    /// Overrides the flush interval of reporters started from now on.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Converges the running reporters onto `desired`.
    ///
    /// Endpoints already running are left untouched.  New endpoints are
    /// validated and started; invalid or unsupported ones are logged and
    /// skipped.  Running endpoints absent from `desired` are stopped.
    /// Never fails: the worst outcome is an endpoint that does not report.
    pub async fn update(&self, desired: &[Endpoint]) -> Reconciliation {
        let mut active = self.active.lock().await;
        let mut summary = Reconciliation::default();
        let mut stale: HashSet<Endpoint> = active.keys().cloned().collect();

        for endpoint in desired {
            stale.remove(endpoint);
            if active.contains_key(endpoint) {
                summary.retained += 1;
                continue;
            }

            if let Err(e) = self.validator.validate(endpoint).await {
                warn!("Ignoring invalid endpoint {}: {}", endpoint, e);
                summary.skipped += 1;
                continue;
            }

            let Some(transport) = self.factory.create(endpoint) else {
                warn!(
                    "{}. Skipping endpoint {}",
                    TransportError::UnsupportedVariant(endpoint.kind().name()),
                    endpoint
                );
                summary.skipped += 1;
                continue;
            };

            let mut reporter = Reporter::new(Arc::clone(&self.source), transport)
                .with_tags(endpoint.merged_tags())
                .with_filter(MetricFilter::new(endpoint.prefix_filters()))
                .with_expansions(EXPANSIONS.to_vec());

            info!("Starting {} for endpoint {}", reporter.id(), endpoint);
            reporter.start(self.interval);
            active.insert(endpoint.clone(), reporter);
            summary.started += 1;
        }

        for endpoint in stale {
            if let Some(mut reporter) = active.remove(&endpoint) {
                reporter.stop().await;
                info!("Stopped {} for endpoint {}", reporter.id(), endpoint);
                summary.stopped += 1;
            }
        }

        summary
    }

    /// Stops every reporter and empties the registry.
    pub async fn stop_all(&self) {
        let mut active = self.active.lock().await;
        info!("Stopping {} reporters", active.len());
        let mut reporters: Vec<Reporter> = active.drain().map(|(_, r)| r).collect();
        join_all(reporters.iter_mut().map(|r| r.stop())).await;
    }

    /// Copy of the current endpoint to reporter mapping.
    pub async fn reporters(&self) -> HashMap<Endpoint, ReporterId> {
        let active = self.active.lock().await;
        active
            .iter()
            .map(|(endpoint, reporter)| (endpoint.clone(), reporter.id()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.active.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.active.lock().await.is_empty()
    }
}
