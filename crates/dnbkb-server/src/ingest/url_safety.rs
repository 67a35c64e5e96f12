//! Outbound URL policy for asset downloads
//!
//! Catalog links are operator-controlled data, so every fetch target is
//! checked before a connection is opened: only `http`/`https`, and no host
//! that is or resolves to a private, loopback, link-local or otherwise
//! reserved address.
//!
//! The up-front check alone leaves a gap between validation and connect, and
//! redirect hops to domain names are not resolved synchronously. The HTTP
//! client therefore also resolves through [`GatedResolver`], which hands the
//! connector only addresses that passed the same policy. Every hop of every
//! request connects to a vetted address.

use async_trait::async_trait;
use std::io;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use url::{Host, Url};

#[derive(Error, Debug)]
pub enum UnsafeUrlError {
    #[error("Invalid URL: {0}")]
    Invalid(#[from] url::ParseError),

    #[error("Unsupported URL scheme: {0}")]
    Scheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("Disallowed IP address: {0}")]
    DisallowedIp(IpAddr),

    #[error("Host {host} resolves to disallowed address {ip}")]
    DisallowedResolution { host: String, ip: IpAddr },

    #[error("Failed to resolve host {host}: {source}")]
    Resolution {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("Host {0} resolved to no addresses")]
    NoAddresses(String),
}

/// Hostname resolution behind the gate
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// Resolves through tokio's system resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.map(|addr: SocketAddr| addr.ip()).collect())
    }
}

#[derive(Clone)]
pub struct UrlSafetyGate {
    resolver: Arc<dyn HostResolver>,
    allow_private: bool,
}

impl std::fmt::Debug for UrlSafetyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSafetyGate")
            .field("allow_private", &self.allow_private)
            .finish()
    }
}

impl UrlSafetyGate {
    pub fn new(allow_private: bool) -> Self {
        Self::with_resolver(Arc::new(SystemResolver), allow_private)
    }

    pub fn with_resolver(resolver: Arc<dyn HostResolver>, allow_private: bool) -> Self {
        Self {
            resolver,
            allow_private,
        }
    }

    pub fn allows_private(&self) -> bool {
        self.allow_private
    }

    /// Validate a fetch target and return it parsed
    ///
    /// Resolution happens on every call; results are never cached.
    pub async fn assert_safe(&self, raw: &str) -> Result<Url, UnsafeUrlError> {
        let url = Url::parse(raw)?;
        let port = check_scheme(&url)?;

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(ip)) => {
                self.check_ip(IpAddr::V4(ip))?;
                return Ok(url);
            },
            Some(Host::Ipv6(ip)) => {
                self.check_ip(IpAddr::V6(ip))?;
                return Ok(url);
            },
            _ => return Err(UnsafeUrlError::MissingHost),
        };

        if self.allow_private {
            return Ok(url);
        }

        self.vetted_addresses(&host, port).await?;
        Ok(url)
    }

    /// Resolve a host and return its addresses if every one of them is allowed
    pub async fn vetted_addresses(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Vec<IpAddr>, UnsafeUrlError> {
        let addrs = self
            .resolver
            .resolve(host, port)
            .await
            .map_err(|source| UnsafeUrlError::Resolution {
                host: host.to_string(),
                source,
            })?;

        if addrs.is_empty() {
            return Err(UnsafeUrlError::NoAddresses(host.to_string()));
        }

        if !self.allow_private {
            if let Some(ip) = addrs.iter().copied().find(|ip| is_disallowed(*ip)) {
                tracing::warn!(host = %host, ip = %ip, "Refusing host with disallowed address");
                return Err(UnsafeUrlError::DisallowedResolution {
                    host: host.to_string(),
                    ip,
                });
            }
        }

        Ok(addrs)
    }

    /// Synchronous check for a redirect hop: scheme and IP literals
    ///
    /// Domain hops are vetted when the client connects, by [`GatedResolver`].
    pub fn check_redirect(&self, url: &Url) -> Result<(), UnsafeUrlError> {
        check_scheme(url)?;
        match url.host() {
            Some(Host::Ipv4(ip)) => self.check_ip(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => self.check_ip(IpAddr::V6(ip)),
            Some(Host::Domain(domain)) if !domain.is_empty() => Ok(()),
            _ => Err(UnsafeUrlError::MissingHost),
        }
    }

    fn check_ip(&self, ip: IpAddr) -> Result<(), UnsafeUrlError> {
        if !self.allow_private && is_disallowed(ip) {
            return Err(UnsafeUrlError::DisallowedIp(ip));
        }
        Ok(())
    }
}

/// DNS resolution for the HTTP client that goes through the gate
///
/// Installed with `ClientBuilder::dns_resolver`, so the addresses checked are
/// exactly the addresses connected to.
#[derive(Debug, Clone)]
pub struct GatedResolver {
    gate: UrlSafetyGate,
}

impl GatedResolver {
    pub fn new(gate: UrlSafetyGate) -> Self {
        Self { gate }
    }
}

impl Resolve for GatedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let gate = self.gate.clone();
        let host = name.as_str().to_string();
        Box::pin(async move {
            match gate.vetted_addresses(&host, 0).await {
                Ok(ips) => {
                    // The connector fills in the port
                    let addrs: Addrs = Box::new(ips.into_iter().map(|ip| SocketAddr::new(ip, 0)));
                    Ok(addrs)
                },
                Err(err) => Err(Box::new(err) as Box<dyn std::error::Error + Send + Sync>),
            }
        })
    }
}

/// Returns the effective port for an allowed scheme
fn check_scheme(url: &Url) -> Result<u16, UnsafeUrlError> {
    match url.scheme() {
        "https" => Ok(url.port().unwrap_or(443)),
        "http" => Ok(url.port().unwrap_or(80)),
        other => Err(UnsafeUrlError::Scheme(other.to_string())),
    }
}

/// True for any address a download must never reach
pub fn is_disallowed(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_disallowed_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_disallowed_v4(v4),
            None => is_disallowed_v6(v6),
        },
    }
}

fn is_disallowed_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        // 0.0.0.0/8 "this network"
        || a == 0
        // 100.64.0.0/10 shared address space
        || (a == 100 && (b & 0xc0) == 64)
        // 192.0.0.0/24 protocol assignments
        || (a == 192 && b == 0 && c == 0)
        // 198.18.0.0/15 benchmarking
        || (a == 198 && (b & 0xfe) == 18)
        // 240.0.0.0/4 reserved
        || a >= 240
}

fn is_disallowed_v6(ip: Ipv6Addr) -> bool {
    let segments = ip.segments();
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    // 64:ff9b::/96 NAT64 carries an IPv4 address in the low bits
    if segments[..6] == [0x0064, 0xff9b, 0, 0, 0, 0] {
        let [.., hi, lo] = segments;
        let embedded = Ipv4Addr::from((u32::from(hi) << 16) | u32::from(lo));
        return is_disallowed_v4(embedded);
    }
    // Only 2000::/3 is global unicast; this also covers fc00::/7,
    // fe80::/10 and ff00::/8
    if (segments[0] & 0xe000) != 0x2000 {
        return true;
    }
    // 2001::/23 IETF protocol assignments, 2001:db8::/32 documentation
    if (segments[0] == 0x2001 && segments[1] < 0x0200)
        || (segments[0] == 0x2001 && segments[1] == 0x0db8)
    {
        return true;
    }
    false
}

/// Resolver with a fixed answer table
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct StaticResolver {
    answers: std::collections::HashMap<String, Vec<IpAddr>>,
}

#[cfg(test)]
impl StaticResolver {
    pub fn with(mut self, host: &str, addrs: &[&str]) -> Self {
        #[allow(clippy::unwrap_used)]
        let parsed = addrs.iter().map(|a| a.parse().unwrap()).collect();
        self.answers.insert(host.to_string(), parsed);
        self
    }
}

#[cfg(test)]
#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        self.answers
            .get(host)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown host"))
    }
}

/// Resolver that gives a different answer on each call, repeating the last
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct SequenceResolver {
    answers: std::sync::Mutex<std::collections::VecDeque<Vec<IpAddr>>>,
}

#[cfg(test)]
impl SequenceResolver {
    pub fn new(answers: &[&str]) -> Self {
        #[allow(clippy::unwrap_used)]
        let parsed = answers.iter().map(|a| vec![a.parse().unwrap()]).collect();
        Self {
            answers: std::sync::Mutex::new(parsed),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl HostResolver for SequenceResolver {
    async fn resolve(&self, _host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        #[allow(clippy::unwrap_used)]
        let mut answers = self.answers.lock().unwrap();
        let answer = if answers.len() > 1 {
            answers.pop_front()
        } else {
            answers.front().cloned()
        };
        answer.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no answers"))
    }
}
