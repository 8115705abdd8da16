use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use log::warn;

use crate::metrics::Sample;
use crate::types::{Endpoint, EndpointKind};

pub mod udp;
pub use udp::UdpTransport;

/// Best-effort delivery channel for metric samples.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers one flush worth of samples tagged with `tags`.
    /// Failures are handled (logged) inside the transport.
    async fn send(&self, samples: &[Sample], tags: &[String]);
}

/// Builds the transport for an endpoint, or `None` when its kind has no
/// transport.
pub trait TransportFactory: Send + Sync {
    fn create(&self, endpoint: &Endpoint) -> Option<Arc<dyn Transport>>;
}

/// Factory covering every built-in endpoint kind.
///
/// Transports resolve their host through `resolver`, which should be the
/// one endpoints were validated with, and give up after `resolve_timeout`.
#[derive(Clone)]
pub struct DefaultTransportFactory {
    resolver: TokioAsyncResolver,
    resolve_timeout: Duration,
}

impl DefaultTransportFactory {
    pub fn new(resolver: TokioAsyncResolver, resolve_timeout: Duration) -> Self {
        Self {
            resolver,
            resolve_timeout,
        }
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, endpoint: &Endpoint) -> Option<Arc<dyn Transport>> {
        match endpoint.kind() {
            EndpointKind::Udp(udp) => match u16::try_from(udp.port) {
                Ok(port) => Some(Arc::new(UdpTransport::new(
                    udp.host.clone(),
                    port,
                    self.resolver.clone(),
                    self.resolve_timeout,
                ))),
                Err(_) => {
                    warn!("Port {} does not fit a UDP transport", udp.port);
                    None
                }
            },
        }
    }
}
