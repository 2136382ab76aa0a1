//! Outbound URL validation
//!
//! Hook and webhook targets are user-supplied URLs. Every resolved address is
//! checked against the reserved ranges below so a registered endpoint cannot
//! be pointed at loopback, link-local, or private infrastructure (SSRF).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use url::{Host, Url};

#[derive(Debug, Error)]
pub enum UrlError {
    #[error("invalid URL: {0}")]
    Invalid(String),
    #[error("URL scheme {0:?} not allowed; use http or https")]
    Scheme(String),
    #[error("URL must have a hostname")]
    MissingHost,
    #[error("cannot resolve hostname {0:?}")]
    Resolve(String),
    #[error("URL resolves to private/reserved IP {0}")]
    ReservedAddress(IpAddr),
}

/// Validate that a URL is safe to contact as a hook or webhook endpoint.
///
/// `allow_private` disables the reserved-range check; tests that target a
/// local listener set it.
pub async fn validate_outbound_url(raw: &str, allow_private: bool) -> Result<(), UrlError> {
    let url = Url::parse(raw).map_err(|e| UrlError::Invalid(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::Scheme(other.to_string())),
    }

    let addrs: Vec<IpAddr> = match url.host() {
        None => return Err(UrlError::MissingHost),
        Some(Host::Ipv4(ip)) => vec![IpAddr::V4(ip)],
        Some(Host::Ipv6(ip)) => vec![IpAddr::V6(ip)],
        Some(Host::Domain(domain)) => {
            let port = url.port_or_known_default().unwrap_or(443);
            let resolved = tokio::net::lookup_host((domain, port))
                .await
                .map_err(|_| UrlError::Resolve(domain.to_string()))?
                .map(|addr| addr.ip())
                .collect::<Vec<_>>();
            if resolved.is_empty() {
                return Err(UrlError::Resolve(domain.to_string()));
            }
            resolved
        }
    };

    if !allow_private {
        for ip in addrs {
            if is_reserved(ip) {
                return Err(UrlError::ReservedAddress(ip));
            }
        }
    }

    Ok(())
}

/// Reserved IPv4 blocks, as (network, prefix length).
const RESERVED_V4: &[(Ipv4Addr, u8)] = &[
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
    (Ipv4Addr::new(127, 0, 0, 0), 8),
    (Ipv4Addr::new(169, 254, 0, 0), 16),  // link-local
    (Ipv4Addr::new(100, 64, 0, 0), 10),   // shared address space (CGN)
    (Ipv4Addr::new(0, 0, 0, 0), 8),       // "this" network
    (Ipv4Addr::new(192, 0, 0, 0), 24),    // IETF protocol assignments
    (Ipv4Addr::new(192, 0, 2, 0), 24),    // TEST-NET-1
    (Ipv4Addr::new(198, 51, 100, 0), 24), // TEST-NET-2
    (Ipv4Addr::new(203, 0, 113, 0), 24),  // TEST-NET-3
    (Ipv4Addr::new(198, 18, 0, 0), 15),   // benchmarking
    (Ipv4Addr::new(224, 0, 0, 0), 4),     // multicast
    (Ipv4Addr::new(240, 0, 0, 0), 4),     // reserved
    (Ipv4Addr::new(255, 255, 255, 255), 32),
];

fn is_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_reserved_v4(v4),
        IpAddr::V6(v6) => is_reserved_v6(v6),
    }
}

fn is_reserved_v4(ip: Ipv4Addr) -> bool {
    let bits = u32::from(ip);
    RESERVED_V4.iter().any(|(net, prefix)| {
        let mask = if *prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix)
        };
        bits & mask == u32::from(*net) & mask
    })
}

fn is_reserved_v6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_reserved_v4(mapped);
    }
    let segments = ip.segments();
    ip.is_loopback()                       // ::1/128
        || segments[0] & 0xfe00 == 0xfc00  // fc00::/7 unique local
        || segments[0] & 0xffc0 == 0xfe80  // fe80::/10 link-local
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_http_schemes() {
        let err = validate_outbound_url("ftp://example.com/x", false)
            .await
            .unwrap_err();
        assert!(matches!(err, UrlError::Scheme(_)));

        let err = validate_outbound_url("file:///etc/passwd", false)
            .await
            .unwrap_err();
        assert!(matches!(err, UrlError::Scheme(_)));
    }

    #[tokio::test]
    async fn test_rejects_reserved_literals() {
        for target in [
            "http://127.0.0.1:8080/hook",
            "http://10.1.2.3/hook",
            "http://172.20.0.1/hook",
            "http://192.168.1.1/hook",
            "http://169.254.169.254/latest/meta-data",
            "http://100.64.0.1/hook",
            "http://198.18.0.1/hook",
            "http://224.0.0.1/hook",
            "http://[::1]/hook",
            "http://[fc00::1]/hook",
            "http://[fe80::1]/hook",
        ] {
            let err = validate_outbound_url(target, false).await.unwrap_err();
            assert!(
                matches!(err, UrlError::ReservedAddress(_)),
                "{target} should be rejected, got {err}"
            );
        }
    }

    #[tokio::test]
    async fn test_allow_private_toggle() {
        validate_outbound_url("http://127.0.0.1:9999/hook", true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_accepts_public_literal() {
        validate_outbound_url("https://93.184.215.14/hook", false)
            .await
            .unwrap();
    }

    #[test]
    fn test_mapped_v4_is_checked() {
        let mapped: Ipv6Addr = "::ffff:10.0.0.1".parse().unwrap();
        assert!(is_reserved_v6(mapped));
    }
}
