// Host parsing and resolution done before a run starts.

use std::net::{IpAddr, SocketAddr};

use crate::config::IpFamily;
use crate::error::ResolveError;
use crate::prober::Target;

/// Splits `host:port`, `[v6]:port` or a bare host. The port is `None` when
/// the input carries none.
pub fn parse_host_port(s: &str) -> (String, Option<u16>) {
    if let Some(rest) = s.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            let host = &rest[..end];
            let port = rest[end + 1..]
                .strip_prefix(':')
                .and_then(|p| p.parse::<u16>().ok());
            return (host.to_string(), port);
        }
    }

    // more than one colon without brackets is a bare IPv6 literal
    if s.matches(':').count() == 1 {
        if let Some(idx) = s.rfind(':') {
            if let Ok(port) = s[idx + 1..].parse::<u16>() {
                return (s[..idx].to_string(), Some(port));
            }
        }
    }
    (s.to_string(), None)
}

fn pick_address(addrs: &[SocketAddr], family: IpFamily) -> Option<SocketAddr> {
    match family {
        IpFamily::V4 => addrs.iter().find(|a| a.is_ipv4()).copied(),
        IpFamily::V6 => addrs.iter().find(|a| a.is_ipv6()).copied(),
        IpFamily::Auto => addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .copied(),
    }
}

fn family_name(family: IpFamily) -> &'static str {
    match family {
        IpFamily::V4 => "IPv4",
        IpFamily::V6 => "IPv6",
        IpFamily::Auto => "usable",
    }
}

/// Resolves `host` once. A failure here means the run must not start.
pub async fn resolve_target(host: &str, port: u16, family: IpFamily) -> Result<Target, ResolveError> {
    // First try to parse as IP address
    if let Ok(ip) = host.parse::<IpAddr>() {
        let addr = SocketAddr::new(ip, port);
        return pick_address(&[addr], family)
            .map(|addr| Target::new(host, addr))
            .ok_or_else(|| ResolveError::NoAddress {
                host: host.to_string(),
                family: family_name(family),
            });
    }

    // If parsing fails, resolve via DNS
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| ResolveError::Lookup {
            host: host.to_string(),
            source,
        })?
        .collect();

    pick_address(&addrs, family)
        .map(|addr| Target::new(host, addr))
        .ok_or_else(|| ResolveError::NoAddress {
            host: host.to_string(),
            family: family_name(family),
        })
}
