//! Client identity derivation for per-client rate limiting.
//!
//! # Trust Model
//!
//! The limiter is keyed by the address it can authenticate: the TCP peer,
//! taken from Axum's `ConnectInfo<SocketAddr>` extension. Forwarding headers
//! are honored only when that peer is a configured trusted proxy:
//!
//! 1. Peer in `TRUSTED_PROXIES` and a parseable `X-Forwarded-For` first hop: use it
//! 2. Peer in `TRUSTED_PROXIES` and a parseable `X-Real-IP`: use it
//! 3. Otherwise: use the peer address, ignoring any forwarding headers
//!
//! An empty trusted set trusts nobody, so a client talking to the service
//! directly cannot pick its own bucket by spoofing `X-Forwarded-For`.
//!
//! ## The "unknown" Fallback
//!
//! Without `ConnectInfo` (e.g. a router driven in-process) every request
//! shares the [`UNKNOWN_CLIENT`] key, which still bounds total throughput.

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::{debug, warn};

/// Shared key for requests whose peer address is not available.
pub const UNKNOWN_CLIENT: &str = "unknown";

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range for trusted proxy validation.
#[derive(Debug, Clone)]
pub struct CidrRange {
    network: IpAddr,
    /// Prefix length (e.g., 24 for /24)
    prefix_len: u8,
}

impl CidrRange {
    /// Parse CIDR notation ("10.0.0.0/8", "::1/128") or a bare address.
    ///
    /// Returns `None` if the format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();

        let Some((addr, prefix)) = cidr.split_once('/') else {
            let ip: IpAddr = cidr.parse().ok()?;
            return Some(Self {
                network: ip,
                prefix_len: max_prefix(&ip),
            });
        };

        let ip: IpAddr = addr.parse().ok()?;
        let prefix_len: u8 = prefix.parse().ok()?;
        if prefix_len > max_prefix(&ip) {
            return None;
        }

        Some(Self {
            network: ip,
            prefix_len,
        })
    }

    /// Check if an IP address is contained within this CIDR range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix_len)).unwrap_or(0);
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

fn max_prefix(ip: &IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// Set of reverse proxies allowed to report the client address.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Build from IP / CIDR strings.
    ///
    /// Invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        if !ranges.is_empty() {
            debug!(count = ranges.len(), "Trusted proxy ranges configured");
        }

        Self { ranges }
    }

    /// True if any proxy range is configured.
    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Check whether a peer address belongs to a trusted proxy.
    ///
    /// Always false when no ranges are configured.
    pub fn is_trusted(&self, peer: &IpAddr) -> bool {
        self.ranges.iter().any(|range| range.contains(peer))
    }
}

// =============================================================================
// Client Key Extraction
// =============================================================================

/// Source of a forwarded client address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForwardedIp {
    FromXff(IpAddr),
    FromRealIp(IpAddr),
    NotFound,
}

/// Read the client address reported by a proxy.
///
/// Only the first `X-Forwarded-For` hop is considered; entries that are not
/// IP addresses are ignored.
#[inline]
fn forwarded_ip<B>(req: &Request<B>) -> ForwardedIp {
    if let Some(value) = req.headers().get(X_FORWARDED_FOR)
        && let Ok(value) = value.to_str()
        && let Some(first) = value.split(',').next()
        && let Ok(ip) = first.trim().parse()
    {
        return ForwardedIp::FromXff(ip);
    }

    if let Some(value) = req.headers().get(X_REAL_IP)
        && let Ok(value) = value.to_str()
        && let Ok(ip) = value.trim().parse()
    {
        return ForwardedIp::FromRealIp(ip);
    }

    ForwardedIp::NotFound
}

/// Peer address recorded by `into_make_service_with_connect_info`.
///
/// IPv4-mapped IPv6 peers (dual-stack listeners) are reported as IPv4.
#[inline]
pub fn peer_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_canonical())
}

/// Derive the rate-limit key for a request.
///
/// Returns `Cow::Borrowed` for the shared "unknown" key and an owned string
/// otherwise.
pub fn client_key<B>(req: &Request<B>, trusted_proxies: &TrustedProxyConfig) -> Cow<'static, str> {
    let Some(peer) = peer_ip(req) else {
        return Cow::Borrowed(UNKNOWN_CLIENT);
    };

    if trusted_proxies.is_trusted(&peer) {
        match forwarded_ip(req) {
            ForwardedIp::FromXff(ip) | ForwardedIp::FromRealIp(ip) => {
                return Cow::Owned(ip.to_string());
            }
            ForwardedIp::NotFound => {
                debug!(peer = %peer, "Trusted proxy sent no usable client address");
            }
        }
    } else if req.headers().contains_key(X_FORWARDED_FOR) {
        debug!(peer = %peer, "Ignoring X-Forwarded-For from untrusted peer");
    }

    Cow::Owned(peer.to_string())
}
