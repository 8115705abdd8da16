//! Endpoint data structures.
//!
//! These are the records the configuration layer hands to the
//! [`ReporterRegistry`](crate::registry::ReporterRegistry).  They are
//! plain values: equality and hashing cover every attribute, so any
//! change to host, port, tags or filters yields a different endpoint
//! and therefore a different registry entry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A `key:value` tag attached to every metric an endpoint reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    key: String,
    value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Wire form of the tag, `key:value`.
    pub fn merged(&self) -> String {
        format!("{}:{}", self.key, self.value)
    }
}

/// Metric name prefix selecting which metrics an endpoint reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrefixFilter {
    prefix: String,
}

impl PrefixFilter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// A statsd agent reachable over UDP.
///
/// `port` is kept wide so that out-of-range values coming from
/// configuration survive deserialization and are rejected by validation
/// instead of by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UdpEndpoint {
    pub host: String,
    pub port: i64,
}

/// The transport-specific part of an endpoint.
///
/// Serialized with a `variant` discriminator so that new kinds can be
/// added without changing the shape of existing records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "lowercase")]
pub enum EndpointKind {
    Udp(UdpEndpoint),
}

impl EndpointKind {
    pub fn name(&self) -> &'static str {
        match self {
            EndpointKind::Udp(_) => "udp",
        }
    }
}

/// One remote metrics destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(flatten)]
    kind: EndpointKind,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    prefix_filters: Vec<PrefixFilter>,
}

impl Endpoint {
    pub fn new(kind: EndpointKind, tags: Vec<Tag>, prefix_filters: Vec<PrefixFilter>) -> Self {
        Self {
            kind,
            tags,
            prefix_filters,
        }
    }

    /// UDP endpoint without tags or filters.
    pub fn udp(host: impl Into<String>, port: i64) -> Self {
        Self::new(
            EndpointKind::Udp(UdpEndpoint {
                host: host.into(),
                port,
            }),
            Vec::new(),
            Vec::new(),
        )
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_prefix_filters(mut self, prefix_filters: Vec<PrefixFilter>) -> Self {
        self.prefix_filters = prefix_filters;
        self
    }

    pub fn kind(&self) -> &EndpointKind {
        &self.kind
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn prefix_filters(&self) -> &[PrefixFilter] {
        &self.prefix_filters
    }

    /// Tags flattened to their `key:value` wire form, in configured order.
    pub fn merged_tags(&self) -> Vec<String> {
        self.tags.iter().map(Tag::merged).collect()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EndpointKind::Udp(udp) => write!(f, "udp://{}:{}", udp.host, udp.port)?,
        }
        if !self.tags.is_empty() {
            write!(f, " tags={:?}", self.merged_tags())?;
        }
        if !self.prefix_filters.is_empty() {
            let prefixes: Vec<&str> = self.prefix_filters.iter().map(|p| p.prefix()).collect();
            write!(f, " prefixes={:?}", prefixes)?;
        }
        Ok(())
    }
}
