//! Metric name filtering by prefix.

use log::debug;

use crate::types::PrefixFilter;

/// Selects metrics whose name starts with one of the configured prefixes.
///
/// Duplicate and empty prefixes are dropped on construction.  A filter
/// built from no usable prefixes matches nothing: an endpoint only
/// reports the metrics it explicitly asks for.
#[derive(Debug, Clone, Default)]
pub struct MetricFilter {
    prefixes: Vec<String>,
}

impl MetricFilter {
    pub fn new(filters: &[PrefixFilter]) -> Self {
        let mut prefixes: Vec<String> = Vec::with_capacity(filters.len());
        for filter in filters {
            let prefix = filter.prefix();
            if prefix.is_empty() || prefixes.iter().any(|p| p == prefix) {
                continue;
            }
            prefixes.push(prefix.to_string());
        }
        Self { prefixes }
    }

    pub fn matches(&self, name: &str) -> bool {
        let matched = self.prefixes.iter().any(|p| name.starts_with(p.as_str()));
        if matched {
            debug!("Metric {} should be included", name);
        } else {
            debug!("Metric {} does not match the filter", name);
        }
        matched
    }

    /// The surviving prefixes, deduplicated and in configured order.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}
