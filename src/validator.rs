//! Endpoint validation.
//!
//! An endpoint is usable when its host resolves and its port is a real
//! UDP port.  Resolution goes through
//! [hickory-resolver](https://crates.io/crates/hickory-resolver) with
//! its cache disabled: every reconciliation pass and every
//! administrative check performs a fresh lookup, since DNS may have
//! changed since the last one.

use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use log::{debug, error};

use crate::error::ValidationError;
use crate::types::{Endpoint, EndpointKind, UdpEndpoint};

const MAX_PORT: i64 = u16::MAX as i64;

/// Decides whether an endpoint may run.
#[async_trait]
pub trait EndpointValidator: Send + Sync {
    /// Checks the endpoint, describing why it is unusable.
    async fn validate(&self, endpoint: &Endpoint) -> Result<(), ValidationError>;

    async fn is_valid(&self, endpoint: &Endpoint) -> bool {
        match self.validate(endpoint).await {
            Ok(()) => true,
            Err(e) => {
                debug!("Endpoint {} is invalid: {}", endpoint, e);
                false
            }
        }
    }
}

/// Validator backed by the system DNS resolver.
pub struct DnsValidator {
    resolver: TokioAsyncResolver,
}

/// System resolver with caching off and lookups bounded by `timeout`.
///
/// One instance is meant to be shared by validation and transports so
/// both see the same view of DNS.
pub fn system_resolver(timeout: Duration) -> TokioAsyncResolver {
    let (config, mut opts) = hickory_resolver::system_conf::read_system_conf()
        .unwrap_or_else(|e| {
            error!(
                "Failed to load system resolv.conf: {}. Falling back to Google DNS.",
                e
            );
            (ResolverConfig::default(), ResolverOpts::default())
        });
    opts.timeout = timeout;
    opts.attempts = 1;
    opts.cache_size = 0;
    TokioAsyncResolver::tokio(config, opts)
}

impl DnsValidator {
    /// Creates a validator on its own system resolver whose lookups give
    /// up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self::with_resolver(system_resolver(timeout))
    }

    pub fn with_resolver(resolver: TokioAsyncResolver) -> Self {
        Self { resolver }
    }

    /// Administrative check of a UDP destination before it is saved.
    ///
    /// Rejects an empty host and port `0` without touching DNS, then
    /// applies the same rule as reconciliation.
    pub async fn test_udp_endpoint(&self, host: &str, port: i64) -> Result<(), ValidationError> {
        if host.is_empty() {
            return Err(ValidationError::EmptyHost);
        }
        if port == 0 {
            return Err(ValidationError::InvalidPort(port));
        }
        self.validate_udp(&UdpEndpoint {
            host: host.to_string(),
            port,
        })
        .await
    }

    async fn validate_udp(&self, udp: &UdpEndpoint) -> Result<(), ValidationError> {
        if udp.host.is_empty() {
            return Err(ValidationError::EmptyHost);
        }
        self.resolve(&udp.host).await?;
        if !(1..=MAX_PORT).contains(&udp.port) {
            return Err(ValidationError::InvalidPort(udp.port));
        }
        Ok(())
    }

    async fn resolve(&self, host: &str) -> Result<(), ValidationError> {
        match self.resolver.lookup_ip(host).await {
            Ok(lookup) if lookup.iter().next().is_some() => Ok(()),
            Ok(_) => Err(ValidationError::UnresolvableHost(host.to_string())),
            Err(e) => {
                debug!("Resolver lookup failed for {}: {}", host, e);
                Err(ValidationError::UnresolvableHost(host.to_string()))
            }
        }
    }
}

impl Default for DnsValidator {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl EndpointValidator for DnsValidator {
    async fn validate(&self, endpoint: &Endpoint) -> Result<(), ValidationError> {
        match endpoint.kind() {
            EndpointKind::Udp(udp) => self.validate_udp(udp).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> DnsValidator {
        DnsValidator::new(Duration::from_millis(500))
    }

    #[tokio::test]
    async fn accepts_port_boundaries_on_localhost() {
        let v = validator();
        assert!(v.is_valid(&Endpoint::udp("localhost", 1)).await);
        assert!(v.is_valid(&Endpoint::udp("localhost", 8125)).await);
        assert!(v.is_valid(&Endpoint::udp("localhost", 65535)).await);
    }

    #[tokio::test]
    async fn accepts_ip_literals() {
        let v = validator();
        assert!(v.is_valid(&Endpoint::udp("127.0.0.1", 8125)).await);
        assert!(v.is_valid(&Endpoint::udp("::1", 8125)).await);
    }

    #[tokio::test]
    async fn rejects_out_of_range_ports() {
        let v = validator();
        assert_eq!(
            v.validate(&Endpoint::udp("localhost", 0)).await,
            Err(ValidationError::InvalidPort(0))
        );
        assert_eq!(
            v.validate(&Endpoint::udp("localhost", 65536)).await,
            Err(ValidationError::InvalidPort(65536))
        );
        assert_eq!(
            v.validate(&Endpoint::udp("localhost", -1)).await,
            Err(ValidationError::InvalidPort(-1))
        );
    }

    #[tokio::test]
    async fn rejects_empty_host() {
        let v = validator();
        assert_eq!(
            v.validate(&Endpoint::udp("", 8125)).await,
            Err(ValidationError::EmptyHost)
        );
    }

    #[tokio::test]
    async fn rejects_unresolvable_host() {
        let v = validator();
        assert_eq!(
            v.validate(&Endpoint::udp("unresolvable.invalid", 8125)).await,
            Err(ValidationError::UnresolvableHost(
                "unresolvable.invalid".to_string()
            ))
        );
        assert!(!v.is_valid(&Endpoint::udp("invalid-host.invalid", 999999)).await);
    }

    #[tokio::test]
    async fn administrative_check_messages() {
        let v = validator();
        assert_eq!(v.test_udp_endpoint("localhost", 8125).await, Ok(()));
        assert_eq!(v.test_udp_endpoint("localhost", 10280).await, Ok(()));

        let err = v.test_udp_endpoint("", 8125).await.unwrap_err();
        assert_eq!(err.to_string(), "host must not be empty");

        let err = v.test_udp_endpoint("localhost", 0).await.unwrap_err();
        assert_eq!(err, ValidationError::InvalidPort(0));

        let err = v.test_udp_endpoint("localhost", 65536).await.unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let err = v
            .test_udp_endpoint("unresolvable.invalid", 8125)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unable to resolve"));
    }

    #[tokio::test]
    async fn port_zero_is_rejected_before_resolution() {
        let v = validator();
        assert_eq!(
            v.test_udp_endpoint("unresolvable.invalid", 0).await,
            Err(ValidationError::InvalidPort(0))
        );
    }
}
