//! Push application metrics to a changing set of statsd collectors.
//!
//! The [`ReporterRegistry`] keeps one periodic [`Reporter`] running per
//! configured [`Endpoint`].  Hand it the full endpoint list whenever the
//! configuration changes and it starts what is new, keeps what is
//! unchanged and stops what was removed:
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use statsd_fanout::{
//!     system_resolver, DefaultTransportFactory, DnsValidator, Endpoint, MetricRegistry,
//!     PrefixFilter, ReporterRegistry, Tag,
//! };
//!
//! # async fn run() {
//! let dns_timeout = Duration::from_secs(2);
//! let resolver = system_resolver(dns_timeout);
//! let metrics = MetricRegistry::new();
//! let registry = ReporterRegistry::new(
//!     Arc::new(metrics.clone()),
//!     Arc::new(DnsValidator::with_resolver(resolver.clone())),
//!     Arc::new(DefaultTransportFactory::new(resolver, dns_timeout)),
//! );
//!
//! let endpoint = Endpoint::udp("localhost", 8125)
//!     .with_tags(vec![Tag::new("env", "prod")])
//!     .with_prefix_filters(vec![PrefixFilter::new("jobs.")]);
//! registry.update(&[endpoint]).await;
//!
//! metrics.increment("jobs.completed", 1);
//!
//! registry.stop_all().await;
//! # }
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod registry;
pub mod reporter;
pub mod transport;
pub mod types;
pub mod validator;

pub use config::Config;
pub use error::{TransportError, ValidationError};
pub use filter::MetricFilter;
pub use metrics::{Expansion, Metric, MetricRegistry, MetricSource, Sample};
pub use registry::{Reconciliation, ReporterRegistry, DEFAULT_FLUSH_INTERVAL};
pub use reporter::{Reporter, ReporterId};
pub use transport::{DefaultTransportFactory, Transport, TransportFactory, UdpTransport};
pub use types::{Endpoint, EndpointKind, PrefixFilter, Tag, UdpEndpoint};
pub use validator::{system_resolver, DnsValidator, EndpointValidator};
