//! DogStatsD over UDP.
//!
//! Every sample goes out as a gauge line `name:value|g|#tag1,tag2`.
//! Lines are packed into datagrams that stay under a conservative MTU.
//! The host is resolved once, on the first flush that succeeds in doing
//! so, through the same resolver that validated the endpoint and under
//! the same timeout.  Nothing here ever reports an error upward: a lost
//! flush is logged and forgotten.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use log::{debug, warn};
use tokio::net::UdpSocket;
use tokio::sync::OnceCell;

use super::Transport;
use crate::error::TransportError;
use crate::metrics::Sample;

/// Largest datagram payload sent, sized for a 1500 byte MTU.
pub const MAX_DATAGRAM: usize = 1432;

pub struct UdpTransport {
    host: String,
    port: u16,
    resolver: TokioAsyncResolver,
    resolve_timeout: Duration,
    addr: OnceCell<SocketAddr>,
    v4: OnceCell<UdpSocket>,
    v6: OnceCell<UdpSocket>,
}

impl UdpTransport {
    pub fn new(
        host: String,
        port: u16,
        resolver: TokioAsyncResolver,
        resolve_timeout: Duration,
    ) -> Self {
        Self {
            host,
            port,
            resolver,
            resolve_timeout,
            addr: OnceCell::new(),
            v4: OnceCell::new(),
            v6: OnceCell::new(),
        }
    }

    /// Address of the collector, resolved once and then kept.  A failed
    /// lookup is retried on the next flush.
    async fn target(&self) -> Result<SocketAddr, TransportError> {
        self.addr
            .get_or_try_init(|| self.resolve())
            .await
            .copied()
    }

    async fn resolve(&self) -> Result<SocketAddr, TransportError> {
        if let Ok(ip) = self.host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }
        let unresolved = |reason: String| TransportError::Resolve(self.host.clone(), reason);
        let lookup = tokio::time::timeout(
            self.resolve_timeout,
            self.resolver.lookup_ip(self.host.as_str()),
        )
        .await
        .map_err(|_| unresolved("timed out".to_string()))?
        .map_err(|e| unresolved(e.to_string()))?;
        let ip = lookup
            .iter()
            .next()
            .ok_or_else(|| unresolved("no addresses".to_string()))?;
        debug!("Resolved {} to {}", self.host, ip);
        Ok(SocketAddr::new(ip, self.port))
    }

    async fn socket(&self, target: &SocketAddr) -> Result<&UdpSocket, TransportError> {
        let (cell, bind) = if target.is_ipv4() {
            (&self.v4, "0.0.0.0:0")
        } else {
            (&self.v6, "[::]:0")
        };
        cell.get_or_try_init(|| async { UdpSocket::bind(bind).await.map_err(TransportError::Bind) })
            .await
    }

    async fn deliver(&self, datagrams: &[String]) -> Result<(), TransportError> {
        let target = self.target().await?;
        let socket = self.socket(&target).await?;
        for datagram in datagrams {
            socket
                .send_to(datagram.as_bytes(), target)
                .await
                .map_err(TransportError::Send)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, samples: &[Sample], tags: &[String]) {
        let lines: Vec<String> = samples
            .iter()
            .filter(|s| s.value.is_finite())
            .map(|s| format_line(s, tags))
            .collect();
        if lines.is_empty() {
            return;
        }
        let datagrams = pack(&lines, MAX_DATAGRAM);
        match self.deliver(&datagrams).await {
            Ok(()) => debug!(
                "Sent {} samples in {} datagrams to {}:{}",
                lines.len(),
                datagrams.len(),
                self.host,
                self.port
            ),
            Err(e) => warn!("Dropping flush to {}:{}: {}", self.host, self.port, e),
        }
    }
}

/// One DogStatsD gauge line.
pub fn format_line(sample: &Sample, tags: &[String]) -> String {
    if tags.is_empty() {
        format!("{}:{}|g", sample.name, sample.value)
    } else {
        format!("{}:{}|g|#{}", sample.name, sample.value, tags.join(","))
    }
}

/// Joins lines with `\n` into payloads of at most `max` bytes.  A line
/// longer than `max` is sent on its own.
fn pack(lines: &[String], max: usize) -> Vec<String> {
    let mut datagrams = Vec::new();
    let mut current = String::new();
    for line in lines {
        if !current.is_empty() && current.len() + 1 + line.len() > max {
            datagrams.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        datagrams.push(current);
    }
    datagrams
}
