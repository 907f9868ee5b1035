//! SOCKS4 wire codec.
//!
//! The client sends a single CONNECT/BIND request (with the 4a
//! hostname extension for unresolved targets) and reads a single fixed
//! 8-byte reply. Replies carry a `0x00` version marker rather than the
//! request's `0x04`, so the two directions never parse alike.

use std::fmt;
use std::net::Ipv4Addr;

use crate::addr::{Address, AddressType};
use crate::codec::{address, ByteReader, IncrementalDecoder, WireMessage};
use crate::error::{ProxyError, Result};

/// SOCKS4 protocol version byte (requests).
pub const SOCKS4_VERSION: u8 = 0x04;
/// Version marker carried by every SOCKS4 server reply.
pub const SOCKS4_REPLY_VERSION: u8 = 0x00;
/// Wire size of a server reply.
pub const SOCKS4_REPLY_LEN: usize = 8;
/// Marker address selecting the 4a hostname form.
const SOCKS4A_MARKER: [u8; 4] = [0, 0, 0, 1];

/// Commands a SOCKS4 client may issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks4Command {
    Connect,
    Bind,
}

impl Socks4Command {
    pub fn code(self) -> u8 {
        match self {
            Socks4Command::Connect => 0x01,
            Socks4Command::Bind => 0x02,
        }
    }
}

/// Status byte of a SOCKS4 server reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks4CommandStatus {
    /// 0x5A: request granted.
    Granted,
    /// 0x5B: request rejected or failed.
    RejectedOrFailed,
    /// 0x5C: client identd not reachable.
    IdentdUnreachable,
    /// 0x5D: identd answered with a different user-id.
    IdentdAuthFailure,
    /// Any byte outside the defined range, preserved for reporting.
    Other(u8),
}

impl Socks4CommandStatus {
    pub fn code(self) -> u8 {
        match self {
            Socks4CommandStatus::Granted => 0x5A,
            Socks4CommandStatus::RejectedOrFailed => 0x5B,
            Socks4CommandStatus::IdentdUnreachable => 0x5C,
            Socks4CommandStatus::IdentdAuthFailure => 0x5D,
            Socks4CommandStatus::Other(code) => code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0x5A => Socks4CommandStatus::Granted,
            0x5B => Socks4CommandStatus::RejectedOrFailed,
            0x5C => Socks4CommandStatus::IdentdUnreachable,
            0x5D => Socks4CommandStatus::IdentdAuthFailure,
            other => Socks4CommandStatus::Other(other),
        }
    }

    pub fn is_granted(self) -> bool {
        self == Socks4CommandStatus::Granted
    }
}

impl fmt::Display for Socks4CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Socks4CommandStatus::Granted => write!(f, "request granted"),
            Socks4CommandStatus::RejectedOrFailed => write!(f, "request rejected or failed"),
            Socks4CommandStatus::IdentdUnreachable => write!(f, "identd unreachable"),
            Socks4CommandStatus::IdentdAuthFailure => write!(f, "identd auth failure"),
            Socks4CommandStatus::Other(code) => write!(f, "unknown status 0x{:02x}", code),
        }
    }
}

/// Client request: command, target, optional user-id.
///
/// IPv4 targets encode natively; domain targets use the 4a form (the
/// `0.0.0.1` marker with the hostname appended after the user-id).
/// IPv6 targets cannot be expressed in SOCKS4 and fail at encode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks4CommandRequest {
    pub command: Socks4Command,
    pub dst: Address,
    pub user_id: String,
}

impl Socks4CommandRequest {
    pub fn connect(dst: Address) -> Self {
        Self {
            command: Socks4Command::Connect,
            dst,
            user_id: String::new(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.user_id.len() > 255 {
            return Err(ProxyError::FieldTooLong {
                field: "user-id",
                len: self.user_id.len(),
            });
        }
        if self.user_id.contains('\0') {
            return Err(ProxyError::InvalidAddress("user-id contains NUL".into()));
        }
        let host = self
            .dst
            .host()
            .ok_or_else(|| ProxyError::InvalidAddress("request needs a target host".into()))?;

        out.push(SOCKS4_VERSION);
        out.push(self.command.code());
        out.extend_from_slice(&self.dst.port().to_be_bytes());
        let hostname = match self.dst.atype() {
            AddressType::Ipv4 => {
                address::write_host(AddressType::Ipv4, Some(host), out)?;
                None
            }
            AddressType::Domain => {
                out.extend_from_slice(&SOCKS4A_MARKER);
                Some(host)
            }
            other => {
                return Err(ProxyError::InvalidAddress(format!(
                    "SOCKS4 cannot address a {} target",
                    other
                )))
            }
        };
        out.extend_from_slice(self.user_id.as_bytes());
        out.push(0);
        if let Some(hostname) = hostname {
            out.extend_from_slice(hostname.as_bytes());
            out.push(0);
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }
}

/// Server reply: status plus an advisory bound address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks4CommandResponse {
    pub status: Socks4CommandStatus,
    pub dst_addr: Option<Ipv4Addr>,
    pub dst_port: u16,
}

impl Socks4CommandResponse {
    pub fn new(status: Socks4CommandStatus) -> Self {
        Self {
            status,
            dst_addr: None,
            dst_port: 0,
        }
    }

    /// Server-side encode: exactly 8 bytes, zero filler for an absent
    /// address.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(SOCKS4_REPLY_VERSION);
        out.push(self.status.code());
        out.extend_from_slice(&self.dst_port.to_be_bytes());
        match self.dst_addr {
            Some(ip) => out.extend_from_slice(&ip.octets()),
            None => out.extend_from_slice(&[0u8; 4]),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SOCKS4_REPLY_LEN);
        self.write_to(&mut out);
        out
    }

    /// Decoded bound address as dotted-quad text.
    pub fn dst_addr_text(&self) -> Option<String> {
        self.dst_addr.map(|ip| ip.to_string())
    }
}

impl WireMessage for Socks4CommandResponse {
    fn read_from(r: &mut ByteReader<'_>) -> Result<Self> {
        // The whole reply must be present before anything is judged;
        // a bad version byte in a short buffer stays NeedMore until
        // all eight bytes arrive.
        if r.remaining() < SOCKS4_REPLY_LEN {
            return Err(ProxyError::Truncated);
        }
        let version = r.take_u8()?;
        if version != SOCKS4_REPLY_VERSION {
            return Err(ProxyError::VersionMismatch {
                expected: SOCKS4_REPLY_VERSION,
                actual: version,
            });
        }
        let status = Socks4CommandStatus::from_code(r.take_u8()?);
        let dst_port = r.take_u16()?;
        let bytes = r.take(4)?;
        let dst_addr = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
        Ok(Self {
            status,
            dst_addr: Some(dst_addr),
            dst_port,
        })
    }
}

/// One-shot decoder for the single SOCKS4 server reply.
pub type Socks4ResponseDecoder = IncrementalDecoder<Socks4CommandResponse>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecodeStatus;

    #[test]
    fn test_reply_decode_granted() {
        let mut dec = Socks4ResponseDecoder::new();
        match dec.feed(&[0x00, 0x5A, 0x1F, 0x90, 0x7F, 0x00, 0x00, 0x01]) {
            DecodeStatus::Complete { message, trailing } => {
                assert_eq!(message.status, Socks4CommandStatus::Granted);
                assert_eq!(message.dst_port, 8080);
                assert_eq!(message.dst_addr_text().as_deref(), Some("127.0.0.1"));
                assert!(trailing.is_empty());
            }
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn test_reply_version_judged_only_at_full_length() {
        let mut dec = Socks4ResponseDecoder::new();
        // Seven bytes with a wrong leading byte: still NeedMore.
        assert!(matches!(
            dec.feed(&[0x04, 0x5A, 0x00, 0x50, 0x01, 0x02, 0x03]),
            DecodeStatus::NeedMore
        ));
        // The eighth byte completes the frame and the version check
        // finally fires.
        match dec.feed(&[0x04]) {
            DecodeStatus::Failed { error } => {
                assert!(matches!(
                    error,
                    ProxyError::VersionMismatch {
                        expected: 0x00,
                        actual: 0x04
                    }
                ));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert!(matches!(dec.feed(&[0x00]), DecodeStatus::Discarded));
    }

    #[test]
    fn test_reply_fragmented_one_byte_at_a_time() {
        let wire = [0x00, 0x5B, 0x00, 0x50, 0x0A, 0x00, 0x00, 0x01];
        let mut dec = Socks4ResponseDecoder::new();
        for byte in &wire[..7] {
            assert!(matches!(dec.feed(&[*byte]), DecodeStatus::NeedMore));
        }
        match dec.feed(&[wire[7]]) {
            DecodeStatus::Complete { message, .. } => {
                assert_eq!(message.status, Socks4CommandStatus::RejectedOrFailed);
                assert_eq!(message.dst_port, 80);
            }
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn test_reply_trailing_bytes_are_payload() {
        let mut wire = Socks4CommandResponse {
            status: Socks4CommandStatus::Granted,
            dst_addr: Some(Ipv4Addr::new(127, 0, 0, 1)),
            dst_port: 8080,
        }
        .to_bytes();
        wire.extend_from_slice(b"early");
        let mut dec = Socks4ResponseDecoder::new();
        match dec.feed(&wire) {
            DecodeStatus::Complete { trailing, .. } => assert_eq!(trailing, b"early"),
            other => panic!("expected Complete, got {:?}", other),
        }
        match dec.feed(b"more") {
            DecodeStatus::Passthrough { payload } => assert_eq!(payload, b"more"),
            other => panic!("expected Passthrough, got {:?}", other),
        }
    }

    #[test]
    fn test_reply_encode_matches_decode() {
        let reply = Socks4CommandResponse {
            status: Socks4CommandStatus::Granted,
            dst_addr: Some(Ipv4Addr::new(127, 0, 0, 1)),
            dst_port: 8080,
        };
        assert_eq!(
            reply.to_bytes(),
            [0x00, 0x5A, 0x1F, 0x90, 0x7F, 0x00, 0x00, 0x01]
        );

        let blank = Socks4CommandResponse::new(Socks4CommandStatus::RejectedOrFailed);
        assert_eq!(blank.to_bytes(), [0x00, 0x5B, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_request_encode_ipv4() {
        let dst = Address::new(AddressType::Ipv4, Some("1.2.3.4"), 80).unwrap();
        let req = Socks4CommandRequest::connect(dst).with_user_id("fred");
        assert_eq!(
            req.to_bytes().unwrap(),
            [0x04, 0x01, 0x00, 0x50, 1, 2, 3, 4, b'f', b'r', b'e', b'd', 0x00]
        );
    }

    #[test]
    fn test_request_encode_socks4a_hostname() {
        let dst = Address::domain("example.com", 80).unwrap();
        let req = Socks4CommandRequest::connect(dst);
        let mut expected = vec![0x04, 0x01, 0x00, 0x50, 0, 0, 0, 1, 0x00];
        expected.extend_from_slice(b"example.com");
        expected.push(0x00);
        assert_eq!(req.to_bytes().unwrap(), expected);
    }

    #[test]
    fn test_request_rejects_ipv6_target() {
        let dst = Address::new(AddressType::Ipv6, Some("::1"), 80).unwrap();
        let err = Socks4CommandRequest::connect(dst).to_bytes().unwrap_err();
        assert!(matches!(err, ProxyError::InvalidAddress(_)));
    }

    #[test]
    fn test_request_rejects_oversize_user_id() {
        let dst = Address::new(AddressType::Ipv4, Some("1.2.3.4"), 80).unwrap();
        let req = Socks4CommandRequest::connect(dst).with_user_id("x".repeat(256));
        let err = req.to_bytes().unwrap_err();
        assert!(matches!(
            err,
            ProxyError::FieldTooLong {
                field: "user-id",
                len: 256
            }
        ));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(
            Socks4CommandStatus::IdentdUnreachable.to_string(),
            "identd unreachable"
        );
        assert_eq!(
            Socks4CommandStatus::Other(0x99).to_string(),
            "unknown status 0x99"
        );
        assert_eq!(Socks4CommandStatus::from_code(0x5A).code(), 0x5A);
    }
}
