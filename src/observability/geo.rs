//! Country attribution for access events.

use std::net::IpAddr;

pub const LOCAL: &str = "LOCAL";
pub const UNKNOWN: &str = "UNKNOWN";
/// Public address with no database to consult.
pub const UNRESOLVED: &str = "XX";

pub trait GeoLookup: Send + Sync {
    /// ISO country code, or a sentinel. Never fails.
    fn country_code_for(&self, ip: &str) -> String;
}

/// Classifies addresses without a GeoIP database.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicGeoLookup;

impl GeoLookup for BasicGeoLookup {
    fn country_code_for(&self, ip: &str) -> String {
        match ip.parse::<IpAddr>() {
            Ok(addr) if is_local(&addr) => LOCAL.to_string(),
            Ok(_) => UNRESOLVED.to_string(),
            Err(_) => UNKNOWN.to_string(),
        }
    }
}

fn is_local(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_local(&IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (first & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (first & 0xffc0) == 0xfe80
        }
    }
}
