//! Target address model shared by every protocol codec.
//!
//! An [`Address`] is the host+port a CONNECT asks the proxy to reach,
//! or the bound address a reply advertises. The host carries its wire
//! tag ([`AddressType`]) so codecs never have to re-classify it.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use crate::error::{ProxyError, Result};

/// SOCKS5 address tag: IPv4.
pub const ATYP_IPV4: u8 = 0x01;
/// SOCKS5 address tag: domain name (one-byte length prefix).
pub const ATYP_DOMAIN: u8 = 0x03;
/// SOCKS5 address tag: IPv6.
pub const ATYP_IPV6: u8 = 0x04;

/// Maximum encoded length of a domain host, dictated by the one-byte
/// length prefix in the wire format.
pub const MAX_DOMAIN_LEN: usize = 255;

/// Wire tag classifying the host field of SOCKS messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
    Ipv4,
    Domain,
    Ipv6,
    /// A tag byte this implementation does not recognize. Kept so a
    /// decoded byte can be reported instead of silently dropped.
    Unknown(u8),
}

impl AddressType {
    /// Wire byte for this tag.
    pub fn code(self) -> u8 {
        match self {
            AddressType::Ipv4 => ATYP_IPV4,
            AddressType::Domain => ATYP_DOMAIN,
            AddressType::Ipv6 => ATYP_IPV6,
            AddressType::Unknown(code) => code,
        }
    }

    /// Classify a wire byte. Never fails; unknown bytes are preserved.
    pub fn from_code(code: u8) -> Self {
        match code {
            ATYP_IPV4 => AddressType::Ipv4,
            ATYP_DOMAIN => AddressType::Domain,
            ATYP_IPV6 => AddressType::Ipv6,
            other => AddressType::Unknown(other),
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressType::Ipv4 => write!(f, "ipv4"),
            AddressType::Domain => write!(f, "domain"),
            AddressType::Ipv6 => write!(f, "ipv6"),
            AddressType::Unknown(code) => write!(f, "unknown(0x{:02x})", code),
        }
    }
}

/// A tagged host plus port.
///
/// `host` is `None` only for the wildcard form responses use to say
/// "no bound address"; it encodes as an all-zero filler. Constructors
/// validate the host text against its tag, so an `Address` in hand is
/// always encodable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    atype: AddressType,
    host: Option<String>,
    port: u16,
}

impl Address {
    /// Create an address, validating the host against the tag.
    ///
    /// Domain hosts are normalized to their ASCII-compatible (IDNA)
    /// form when the input is not already ASCII; the normalized form
    /// must fit the 255-byte wire limit.
    pub fn new(atype: AddressType, host: Option<&str>, port: u16) -> Result<Self> {
        let host = match host {
            None => None,
            Some(text) => Some(Self::validate_host(atype, text)?),
        };
        Ok(Self { atype, host, port })
    }

    /// Create a domain-tagged address.
    pub fn domain(host: &str, port: u16) -> Result<Self> {
        Self::new(AddressType::Domain, Some(host), port)
    }

    /// Create an address from an IP, tagging it by family.
    pub fn from_ip(ip: IpAddr, port: u16) -> Self {
        let atype = match ip {
            IpAddr::V4(_) => AddressType::Ipv4,
            IpAddr::V6(_) => AddressType::Ipv6,
        };
        Self {
            atype,
            host: Some(ip.to_string()),
            port,
        }
    }

    /// Create an address from a resolved socket address.
    ///
    /// The textual output is identical to tagging the same host/port
    /// by hand, so resolved and unresolved inputs render the same.
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        Self::from_ip(addr.ip(), addr.port())
    }

    /// The wildcard form: no host, port zero. Encodes as zeros.
    pub fn unspecified(atype: AddressType) -> Self {
        Self {
            atype,
            host: None,
            port: 0,
        }
    }

    /// Trusted constructor for text produced by the wire decoders,
    /// which is valid by construction (fixed-width IPs, length-checked
    /// domains) and must not be re-validated or re-normalized.
    pub(crate) fn from_wire(atype: AddressType, host: Option<String>, port: u16) -> Self {
        Self { atype, host, port }
    }

    pub fn atype(&self) -> AddressType {
        self.atype
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// True for IPv6-tagged addresses; callers use this to decide on
    /// bracketing when rendering `host:port` text.
    pub fn is_ipv6(&self) -> bool {
        matches!(self.atype, AddressType::Ipv6)
    }

    fn validate_host(atype: AddressType, text: &str) -> Result<String> {
        match atype {
            AddressType::Ipv4 => {
                text.parse::<Ipv4Addr>()
                    .map_err(|_| ProxyError::InvalidAddress(format!("not a dotted-quad: {text}")))?;
                Ok(text.to_string())
            }
            AddressType::Ipv6 => {
                let trimmed = text
                    .strip_prefix('[')
                    .and_then(|rest| rest.strip_suffix(']'))
                    .unwrap_or(text);
                trimmed
                    .parse::<Ipv6Addr>()
                    .map_err(|_| ProxyError::InvalidAddress(format!("not an IPv6 literal: {text}")))?;
                Ok(trimmed.to_string())
            }
            AddressType::Domain => {
                if text.is_empty() {
                    return Err(ProxyError::InvalidAddress("empty domain".into()));
                }
                let encoded = if text.is_ascii() {
                    if text.contains('\0') {
                        return Err(ProxyError::InvalidAddress("domain contains NUL".into()));
                    }
                    text.to_string()
                } else {
                    // IDNA transform so the name fits the single-byte
                    // length-prefixed ASCII field.
                    match url::Host::parse(text) {
                        Ok(url::Host::Domain(ascii)) => ascii,
                        _ => {
                            return Err(ProxyError::InvalidAddress(format!(
                                "cannot encode domain: {text}"
                            )))
                        }
                    }
                };
                if encoded.len() > MAX_DOMAIN_LEN {
                    return Err(ProxyError::FieldTooLong {
                        field: "domain",
                        len: encoded.len(),
                    });
                }
                Ok(encoded)
            }
            AddressType::Unknown(code) => Err(ProxyError::UnsupportedAddressType(code)),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host.as_deref() {
            Some(host) if self.is_ipv6() => write!(f, "[{}]:{}", host, self.port),
            Some(host) => write!(f, "{}:{}", host, self.port),
            None => write!(f, "*:{}", self.port),
        }
    }
}

impl FromStr for Address {
    type Err = ProxyError;

    /// Parse `host:port` text, with IPv6 hosts in brackets
    /// (`[::1]:8080`). The port is mandatory.
    fn from_str(s: &str) -> Result<Self> {
        let (host_text, port_text) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| ProxyError::InvalidAddress(format!("unclosed bracket: {s}")))?;
            let port = tail
                .strip_prefix(':')
                .ok_or_else(|| ProxyError::InvalidAddress(format!("missing port: {s}")))?;
            (host, port)
        } else {
            s.rsplit_once(':')
                .ok_or_else(|| ProxyError::InvalidAddress(format!("missing port: {s}")))?
        };
        if host_text.contains(':') {
            // A bare IPv6 literal without brackets is ambiguous.
            return Err(ProxyError::InvalidAddress(format!(
                "IPv6 host must be bracketed: {s}"
            )));
        }
        let port: u16 = port_text
            .parse()
            .map_err(|_| ProxyError::PortOutOfRange(port_text.to_string()))?;

        if let Ok(v4) = host_text.parse::<Ipv4Addr>() {
            return Ok(Address::from_ip(IpAddr::V4(v4), port));
        }
        if let Ok(v6) = host_text.parse::<Ipv6Addr>() {
            return Ok(Address::from_ip(IpAddr::V6(v6), port));
        }
        Address::domain(host_text, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_roundtrip_display() {
        let addr = Address::new(AddressType::Ipv4, Some("127.0.0.1"), 8080).unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:8080");
        assert_eq!(addr.atype(), AddressType::Ipv4);
    }

    #[test]
    fn test_ipv6_display_is_bracketed() {
        let addr = Address::new(AddressType::Ipv6, Some("::1"), 8080).unwrap();
        assert_eq!(addr.to_string(), "[::1]:8080");
    }

    #[test]
    fn test_bracketed_ipv6_input_is_unwrapped() {
        let addr = Address::new(AddressType::Ipv6, Some("[::1]"), 443).unwrap();
        assert_eq!(addr.host(), Some("::1"));
    }

    #[test]
    fn test_invalid_ipv4_literal_rejected() {
        let err = Address::new(AddressType::Ipv4, Some("999.0.0.1"), 80).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidAddress(_)));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = Address::new(AddressType::Unknown(0x7f), Some("x"), 80).unwrap_err();
        assert!(matches!(err, ProxyError::UnsupportedAddressType(0x7f)));
    }

    #[test]
    fn test_domain_length_boundary() {
        let max = "a".repeat(255);
        let addr = Address::domain(&max, 80).unwrap();
        assert_eq!(addr.host().unwrap().len(), 255);

        let over = "a".repeat(256);
        let err = Address::domain(&over, 80).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::FieldTooLong { field: "domain", len: 256 }
        ));
    }

    #[test]
    fn test_non_ascii_domain_gets_ascii_form() {
        let addr = Address::domain("bücher.example", 443).unwrap();
        assert_eq!(addr.host(), Some("xn--bcher-kva.example"));
    }

    #[test]
    fn test_ascii_domain_passes_through_verbatim() {
        // A dotted-quad tagged as a domain must stay a domain; only
        // non-ASCII input goes through the normalizer.
        let addr = Address::domain("1.2.3.4", 80).unwrap();
        assert_eq!(addr.atype(), AddressType::Domain);
        assert_eq!(addr.host(), Some("1.2.3.4"));
    }

    #[test]
    fn test_from_str_classifies() {
        let v4: Address = "10.0.0.1:80".parse().unwrap();
        assert_eq!(v4.atype(), AddressType::Ipv4);

        let v6: Address = "[2001:db8::1]:8080".parse().unwrap();
        assert_eq!(v6.atype(), AddressType::Ipv6);
        assert_eq!(v6.host(), Some("2001:db8::1"));

        let dom: Address = "example.com:443".parse().unwrap();
        assert_eq!(dom.atype(), AddressType::Domain);
    }

    #[test]
    fn test_from_str_port_bounds() {
        assert!("example.com:0".parse::<Address>().is_ok());
        assert!("example.com:65535".parse::<Address>().is_ok());
        let err = "example.com:65536".parse::<Address>().unwrap_err();
        assert!(matches!(err, ProxyError::PortOutOfRange(_)));
        let err = "example.com:-1".parse::<Address>().unwrap_err();
        assert!(matches!(err, ProxyError::PortOutOfRange(_)));
    }

    #[test]
    fn test_from_str_requires_port() {
        assert!("example.com".parse::<Address>().is_err());
        assert!("::1".parse::<Address>().is_err());
    }

    #[test]
    fn test_resolved_and_unresolved_render_identically() {
        let resolved = Address::from_socket_addr("127.0.0.1:80".parse().unwrap());
        let unresolved = Address::new(AddressType::Ipv4, Some("127.0.0.1"), 80).unwrap();
        assert_eq!(resolved.to_string(), unresolved.to_string());
        assert_eq!(resolved, unresolved);
    }

    #[test]
    fn test_unspecified_display() {
        let addr = Address::unspecified(AddressType::Ipv4);
        assert_eq!(addr.to_string(), "*:0");
        assert_eq!(addr.host(), None);
    }
}
