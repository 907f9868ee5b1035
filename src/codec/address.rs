//! Tagged address field shared by the SOCKS codecs.
//!
//! Hosts travel as `atyp`-selected representations: 4 raw bytes for
//! IPv4, 16 for IPv6, a one-byte length prefix plus ASCII text for
//! domains. Encoding an absent host writes the tag's all-zero filler
//! so responses can advertise "no bound address" without a sentinel
//! value.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::addr::{Address, AddressType, MAX_DOMAIN_LEN};
use crate::error::{ProxyError, Result};

use super::ByteReader;

/// Read the host representation selected by `atype`.
///
/// Short input raises the `Truncated` signal without advancing the
/// caller's committed position (readers are scratch); an unrecognized
/// tag is a permanent failure.
pub fn read_host(atype: AddressType, r: &mut ByteReader<'_>) -> Result<String> {
    match atype {
        AddressType::Ipv4 => {
            let bytes = r.take(4)?;
            let octets: [u8; 4] = [bytes[0], bytes[1], bytes[2], bytes[3]];
            Ok(Ipv4Addr::from(octets).to_string())
        }
        AddressType::Domain => {
            let len = r.take_u8()? as usize;
            let bytes = r.take(len)?;
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        AddressType::Ipv6 => {
            let bytes = r.take(16)?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            Ok(Ipv6Addr::from(octets).to_string())
        }
        AddressType::Unknown(code) => Err(ProxyError::UnsupportedAddressType(code)),
    }
}

/// Read a full tagged address: `atyp`, host representation, port.
pub fn read_address(r: &mut ByteReader<'_>) -> Result<Address> {
    let atype = AddressType::from_code(r.take_u8()?);
    let host = read_host(atype, r)?;
    let port = r.take_u16()?;
    Ok(Address::from_wire(atype, Some(host), port))
}

/// Write the host representation for `atype`. `None` writes the
/// all-zero filler (4, 1, or 16 bytes).
pub fn write_host(atype: AddressType, host: Option<&str>, out: &mut Vec<u8>) -> Result<()> {
    match (atype, host) {
        (AddressType::Ipv4, Some(text)) => {
            let ip: Ipv4Addr = text
                .parse()
                .map_err(|_| ProxyError::InvalidAddress(format!("not a dotted-quad: {text}")))?;
            out.extend_from_slice(&ip.octets());
        }
        (AddressType::Ipv4, None) => out.extend_from_slice(&[0u8; 4]),
        (AddressType::Domain, Some(text)) => {
            if text.len() > MAX_DOMAIN_LEN {
                return Err(ProxyError::FieldTooLong {
                    field: "domain",
                    len: text.len(),
                });
            }
            out.push(text.len() as u8);
            out.extend_from_slice(text.as_bytes());
        }
        (AddressType::Domain, None) => out.push(0),
        (AddressType::Ipv6, Some(text)) => {
            let ip: Ipv6Addr = text
                .parse()
                .map_err(|_| ProxyError::InvalidAddress(format!("not an IPv6 literal: {text}")))?;
            out.extend_from_slice(&ip.octets());
        }
        (AddressType::Ipv6, None) => out.extend_from_slice(&[0u8; 16]),
        (AddressType::Unknown(code), _) => return Err(ProxyError::UnsupportedAddressType(code)),
    }
    Ok(())
}

/// Write a full tagged address: `atyp`, host representation, port.
pub fn write_address(addr: &Address, out: &mut Vec<u8>) -> Result<()> {
    out.push(addr.atype().code());
    write_host(addr.atype(), addr.host(), out)?;
    out.extend_from_slice(&addr.port().to_be_bytes());
    Ok(())
}
