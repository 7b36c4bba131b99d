//! Client identity resolution.
//!
//! The source address is picked from proxy headers or the peer address, then folded into a
//! short opaque token. The token is a bucketing key for abuse accounting, not an identity
//! proof: it is not reversible in practice but collisions are accepted.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::header::HeaderMap;

/// Sentinel used when no source address can be determined.
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Header candidates consulted before the peer address, in priority order.
const ADDRESS_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Opaque per-source-address accounting key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Wrap an already hashed token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns a raw address into a [`ClientIdentity`].
///
/// Implementations must be pure: the same input always yields the same identity.
pub trait IdentityHasher: Send + Sync + fmt::Debug {
    /// Hash a raw address.
    fn hash(&self, raw_address: &str) -> ClientIdentity;
}

/// 32-bit polynomial rolling hash (`h = h * 31 + unit` over UTF-16 code units), absolute value
/// in lower-case hex, prefixed with `ip_`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RollingHasher;

impl IdentityHasher for RollingHasher {
    fn hash(&self, raw_address: &str) -> ClientIdentity {
        let folded = raw_address
            .encode_utf16()
            .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
        // i64 so that i32::MIN has an absolute value.
        ClientIdentity(format!("ip_{:x}", i64::from(folded).abs()))
    }
}

/// Picks the originating address of a request and hashes it.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    hasher: Arc<dyn IdentityHasher>,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self { hasher: Arc::new(RollingHasher) }
    }
}

impl IdentityResolver {
    /// Use a different hashing scheme.
    pub fn with_hasher<H: IdentityHasher + 'static>(hasher: H) -> Self {
        Self { hasher: Arc::new(hasher) }
    }

    /// First usable candidate among the proxy headers, the peer address, then
    /// [`UNKNOWN_ADDRESS`].
    pub fn source_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        for name in ADDRESS_HEADERS {
            let candidate = headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty());
            if let Some(address) = candidate {
                return address.to_string();
            }
        }
        peer.map(|addr| addr.ip().to_string()).unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
    }

    /// Resolve the identity of a request.
    pub fn resolve(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientIdentity {
        self.hasher.hash(&Self::source_address(headers, peer))
    }

    /// Hash an already extracted address.
    pub fn hash_address(&self, raw_address: &str) -> ClientIdentity {
        self.hasher.hash(raw_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn rolling_hash_matches_known_values() {
        // "a" = 97 = 0x61; "ab" = 97 * 31 + 98 = 3105 = 0xc21
        assert_eq!(RollingHasher.hash("a").as_str(), "ip_61");
        assert_eq!(RollingHasher.hash("ab").as_str(), "ip_c21");
        assert_eq!(RollingHasher.hash("").as_str(), "ip_0");
    }

    #[test]
    fn hash_is_pure() {
        let resolver = IdentityResolver::default();
        let a = resolver.hash_address("203.0.113.7");
        let b = resolver.hash_address("203.0.113.7");
        assert_eq!(a, b);
        assert_ne!(a, resolver.hash_address("203.0.113.8"));
        assert!(a.as_str().starts_with("ip_"));
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let map = headers(&[("x-forwarded-for", " 198.51.100.1 , 10.0.0.1"), ("x-real-ip", "10.9.9.9")]);
        assert_eq!(IdentityResolver::source_address(&map, None), "198.51.100.1");
    }

    #[test]
    fn falls_through_header_priority() {
        let map = headers(&[("x-forwarded-for", "  "), ("x-real-ip", "192.0.2.5")]);
        assert_eq!(IdentityResolver::source_address(&map, None), "192.0.2.5");

        let map = headers(&[("cf-connecting-ip", "192.0.2.9")]);
        assert_eq!(IdentityResolver::source_address(&map, None), "192.0.2.9");
    }

    #[test]
    fn uses_peer_then_sentinel() {
        let peer: SocketAddr = "192.0.2.44:5555".parse().unwrap();
        assert_eq!(IdentityResolver::source_address(&HeaderMap::new(), Some(peer)), "192.0.2.44");
        assert_eq!(IdentityResolver::source_address(&HeaderMap::new(), None), UNKNOWN_ADDRESS);
    }

    #[derive(Debug)]
    struct Constant;

    impl IdentityHasher for Constant {
        fn hash(&self, _raw_address: &str) -> ClientIdentity {
            ClientIdentity::new("fixed")
        }
    }

    #[test]
    fn hasher_is_swappable() {
        let resolver = IdentityResolver::with_hasher(Constant);
        assert_eq!(resolver.resolve(&HeaderMap::new(), None).as_str(), "fixed");
    }
}
