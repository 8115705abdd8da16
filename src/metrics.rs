//! Metric snapshots and the in-memory registry reporters read from.
//!
//! Reporters only depend on [`MetricSource`]; [`MetricRegistry`] is the
//! implementation the daemon uses for its own metrics and the one tests
//! populate directly.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

/// Number of recent samples a histogram keeps for quantiles.
const RESERVOIR_SIZE: usize = 1028;

/// Point-in-time value of one metric.
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    Counter(u64),
    Gauge(f64),
    Histogram(HistogramSnapshot),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramSnapshot {
    /// Total number of recorded values, not only those in the reservoir.
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
}

impl HistogramSnapshot {
    fn from_values(count: u64, values: &VecDeque<f64>) -> Self {
        if values.is_empty() {
            return Self {
                count,
                ..Default::default()
            };
        }
        let mut sorted: Vec<f64> = values.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let sum: f64 = sorted.iter().sum();
        Self {
            count,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: sum / sorted.len() as f64,
            median: quantile(&sorted, 0.5),
            p95: quantile(&sorted, 0.95),
            p99: quantile(&sorted, 0.99),
        }
    }
}

/// Nearest-rank quantile over a sorted, non-empty slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Which derived values a histogram is reported as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expansion {
    Count,
    Min,
    Max,
    Mean,
    Median,
    P95,
    P99,
}

impl Expansion {
    pub fn suffix(self) -> &'static str {
        match self {
            Expansion::Count => "count",
            Expansion::Min => "min",
            Expansion::Max => "max",
            Expansion::Mean => "mean",
            Expansion::Median => "median",
            Expansion::P95 => "p95",
            Expansion::P99 => "p99",
        }
    }

    fn value(self, h: &HistogramSnapshot) -> f64 {
        match self {
            Expansion::Count => h.count as f64,
            Expansion::Min => h.min,
            Expansion::Max => h.max,
            Expansion::Mean => h.mean,
            Expansion::Median => h.median,
            Expansion::P95 => h.p95,
            Expansion::P99 => h.p99,
        }
    }
}

/// A single named value ready to be put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub value: f64,
}

/// Flattens one metric into wire samples.
///
/// Counters and gauges keep their own name.  Histograms produce one
/// `name.<suffix>` sample per expansion.
pub fn expand(name: &str, metric: &Metric, expansions: &[Expansion]) -> Vec<Sample> {
    match metric {
        Metric::Counter(count) => vec![Sample {
            name: name.to_string(),
            value: *count as f64,
        }],
        Metric::Gauge(value) => vec![Sample {
            name: name.to_string(),
            value: *value,
        }],
        Metric::Histogram(h) => expansions
            .iter()
            .map(|e| Sample {
                name: format!("{}.{}", name, e.suffix()),
                value: e.value(h),
            })
            .collect(),
    }
}

/// Source of metric snapshots, owned outside the reporting machinery.
pub trait MetricSource: Send + Sync {
    /// Current metrics keyed by name.
    fn snapshot(&self) -> Vec<(String, Metric)>;
}

#[derive(Debug)]
enum Entry {
    Counter(u64),
    Gauge(f64),
    Histogram { count: u64, values: VecDeque<f64> },
}

/// Thread-safe in-memory metric registry. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    entries: Arc<Mutex<BTreeMap<String, Entry>>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `by` to a counter, creating it at zero. A name already used by
    /// another metric type is replaced.
    pub fn increment(&self, name: &str, by: u64) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(name) {
            Some(Entry::Counter(count)) => *count = count.saturating_add(by),
            _ => {
                entries.insert(name.to_string(), Entry::Counter(by));
            }
        }
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(name.to_string(), Entry::Gauge(value));
    }

    /// Records one histogram value.
    pub fn record(&self, name: &str, value: f64) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(name) {
            Some(Entry::Histogram { count, values }) => {
                *count += 1;
                if values.len() == RESERVOIR_SIZE {
                    values.pop_front();
                }
                values.push_back(value);
            }
            _ => {
                entries.insert(
                    name.to_string(),
                    Entry::Histogram {
                        count: 1,
                        values: VecDeque::from([value]),
                    },
                );
            }
        }
    }

    pub fn remove(&self, name: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(name);
    }
}

impl MetricSource for MetricRegistry {
    fn snapshot(&self) -> Vec<(String, Metric)> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .map(|(name, entry)| {
                let metric = match entry {
                    Entry::Counter(count) => Metric::Counter(*count),
                    Entry::Gauge(value) => Metric::Gauge(*value),
                    Entry::Histogram { count, values } => {
                        Metric::Histogram(HistogramSnapshot::from_values(*count, values))
                    }
                };
                (name.clone(), metric)
            })
            .collect()
    }
}
