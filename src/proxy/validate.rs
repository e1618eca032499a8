//! Target url validation and destination filtering.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use thiserror::Error;
use tracing::{debug, warn};
use url::{Host, Url};

use super::error::ProxyError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Parse an absolute http(s) url
pub fn parse_target_url(raw: &str) -> Result<Url, ProxyError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ProxyError::InvalidRequest(format!("invalid url {:?}: {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ProxyError::InvalidRequest(format!(
                "unsupported url scheme: {}",
                other
            )));
        }
    }
    if url.host().is_none() {
        return Err(ProxyError::InvalidRequest(format!("url has no host: {}", raw)));
    }
    Ok(url)
}

fn is_blocked_ipv4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        // 0.0.0.0/8
        || a == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (b & 0xc0) == 64)
}

fn is_blocked_ipv6(ip: &Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_blocked_ipv4(&mapped);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
}

/// Loopback, private, link-local, unspecified and similar non-public addresses
pub fn is_blocked_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => is_blocked_ipv6(v6),
    }
}

fn blocked(url: &Url, detail: &str) -> ProxyError {
    warn!(url = %url, detail = %detail, "Blocked proxy destination");
    ProxyError::InvalidRequest(format!("destination not allowed: {}", detail))
}

/// Reject urls whose host is a non-public literal address or a localhost name.
///
/// Other host names are checked when the client resolves them, see [`PublicOnlyResolver`].
pub fn ensure_public_host(url: &Url) -> Result<(), ProxyError> {
    match url.host() {
        Some(Host::Ipv4(ip)) if is_blocked_ipv4(&ip) => Err(blocked(url, &ip.to_string())),
        Some(Host::Ipv6(ip)) if is_blocked_ipv6(&ip) => Err(blocked(url, &ip.to_string())),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                return Err(blocked(url, &domain));
            }
            Ok(())
        }
        Some(_) => Ok(()),
        None => Err(ProxyError::InvalidRequest(format!("url has no host: {}", url))),
    }
}

/// Every resolved address of a host was non-public
#[derive(Debug, Error)]
#[error("destination not allowed: {host} resolves only to non-public addresses")]
pub struct DestinationBlocked {
    pub host: String,
}

/// Public addresses only, order preserved
pub fn public_addrs(addrs: impl IntoIterator<Item = SocketAddr>) -> Vec<SocketAddr> {
    addrs.into_iter().filter(|addr| !is_blocked_ip(&addr.ip())).collect()
}

/// Host resolution through the operating system resolver
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((name.as_str(), 0)).await?.collect();
            Ok::<Addrs, BoxError>(Box::new(addrs.into_iter()))
        })
    }
}

/// Resolver installed in the proxy client when private networks are blocked.
/// Non-public addresses are dropped from the set the client connects to.
#[derive(Clone)]
pub struct PublicOnlyResolver {
    inner: Arc<dyn Resolve>,
}

impl PublicOnlyResolver {
    pub fn new(inner: Arc<dyn Resolve>) -> Self {
        Self { inner }
    }
}

impl Resolve for PublicOnlyResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let inner = self.inner.clone();
        Box::pin(async move {
            let host = name.as_str().to_string();
            let resolved: Vec<SocketAddr> = inner.resolve(name).await?.collect();
            let allowed = public_addrs(resolved.iter().copied());
            if allowed.is_empty() {
                warn!(host = %host, resolved = ?resolved, "Blocked proxy destination");
                return Err(Box::new(DestinationBlocked { host }) as BoxError);
            }
            if allowed.len() < resolved.len() {
                debug!(host = %host, kept = allowed.len(), dropped = resolved.len() - allowed.len(), "Dropped non-public addresses");
            }
            Ok::<Addrs, BoxError>(Box::new(allowed.into_iter()))
        })
    }
}
