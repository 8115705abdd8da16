//! Periodic metric reporter.
//!
//! A [`Reporter`] binds a metric source to one transport.  Once started
//! it runs in a dedicated task that, every interval, snapshots the
//! source, keeps the metrics its filter selects, expands them and hands
//! the samples to the transport.  The flush never blocks the caller and
//! never fails: delivery problems stay inside the transport.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::filter::MetricFilter;
use crate::metrics::{expand, Expansion, MetricSource, Sample};
use crate::transport::Transport;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one reporter instance.  Two handles compare equal only
/// if they refer to the same reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReporterId(u64);

impl fmt::Display for ReporterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reporter-{}", self.0)
    }
}

/// Everything one flush needs, shared with the background task.
#[derive(Clone)]
struct FlushJob {
    source: Arc<dyn MetricSource>,
    transport: Arc<dyn Transport>,
    tags: Vec<String>,
    filter: MetricFilter,
    expansions: Vec<Expansion>,
}

impl FlushJob {
    fn collect(&self) -> Vec<Sample> {
        self.source
            .snapshot()
            .into_iter()
            .filter(|(name, _)| self.filter.matches(name))
            .flat_map(|(name, metric)| expand(&name, &metric, &self.expansions))
            .collect()
    }

    async fn flush(&self) {
        let samples = self.collect();
        if samples.is_empty() {
            trace!("Nothing to report");
            return;
        }
        self.transport.send(&samples, &self.tags).await;
    }
}

struct RunningTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct Reporter {
    id: ReporterId,
    job: Arc<FlushJob>,
    task: Option<RunningTask>,
}

impl Reporter {
    /// Creates a stopped reporter with no tags, a filter that matches
    /// nothing and no histogram expansions.
    pub fn new(source: Arc<dyn MetricSource>, transport: Arc<dyn Transport>) -> Self {
        Self {
            id: ReporterId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            job: Arc::new(FlushJob {
                source,
                transport,
                tags: Vec::new(),
                filter: MetricFilter::default(),
                expansions: Vec::new(),
            }),
            task: None,
        }
    }

    pub fn with_tags(self, tags: Vec<String>) -> Self {
        self.map_job(|job| job.tags = tags)
    }

    pub fn with_filter(self, filter: MetricFilter) -> Self {
        self.map_job(|job| job.filter = filter)
    }

    pub fn with_expansions(self, expansions: Vec<Expansion>) -> Self {
        self.map_job(|job| job.expansions = expansions)
    }

    /// Builder calls belong before `start`.  On a running reporter the
    /// change only reaches `report` and the next `start`, never the task
    /// already flushing.
    fn map_job(mut self, f: impl FnOnce(&mut FlushJob)) -> Self {
        debug_assert!(
            self.task.is_none(),
            "{} configured after start",
            self.id
        );
        if self.task.is_some() {
            warn!("{} is running, configuration applies from the next start", self.id);
        }
        f(Arc::make_mut(&mut self.job));
        self
    }

    pub fn id(&self) -> ReporterId {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Starts flushing every `period`, the first flush one period from now.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, period: Duration) {
        if self.task.is_some() {
            warn!("{} already started", self.id);
            return;
        }
        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let job = Arc::clone(&self.job);
        let id = self.id;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!("{} started, flushing every {:?}", id, period);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => {
                        debug!("{} flush abandoned on stop", id);
                        break;
                    }
                    _ = job.flush() => {}
                }
            }
            debug!("{} stopped", id);
        });

        self.task = Some(RunningTask { shutdown, handle });
    }

    /// Stops the flush task.  Returns once the task has exited, so no
    /// further flush will happen; a flush underway is dropped rather than
    /// waited for.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let _ = task.shutdown.send(());
        if let Err(e) = task.handle.await {
            warn!("{} task ended abnormally: {}", self.id, e);
        }
    }

    /// Runs one flush immediately, outside the schedule.
    pub async fn report(&self) {
        self.job.flush().await;
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.handle.abort();
        }
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("id", &self.id)
            .field("tags", &self.job.tags)
            .field("prefixes", &self.job.filter.prefixes())
            .field("running", &self.is_running())
            .finish()
    }
}
