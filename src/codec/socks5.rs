//! SOCKS5 wire codec.
//!
//! Messages for all three handshake rounds (method greeting,
//! username/password subnegotiation, command exchange) in both
//! directions, with one-shot incremental decoders for each. Encoders
//! write into plain byte vectors; decoders follow the shared
//! [`IncrementalDecoder`] contract.

use std::fmt;

use crate::addr::Address;
use crate::codec::{address, ByteReader, IncrementalDecoder, WireMessage};
use crate::error::{ProxyError, Result};

/// SOCKS5 protocol version.
pub const SOCKS5_VERSION: u8 = 0x05;
/// Username/password subnegotiation version.
pub const PASSWORD_AUTH_VERSION: u8 = 0x01;
/// Reserved byte value in command messages.
pub const RESERVED: u8 = 0x00;

/// No authentication required.
pub const AUTH_NONE: u8 = 0x00;
/// GSSAPI authentication.
pub const AUTH_GSSAPI: u8 = 0x01;
/// Username/password authentication.
pub const AUTH_PASSWORD: u8 = 0x02;
/// No acceptable methods.
pub const AUTH_NO_ACCEPTABLE: u8 = 0xFF;

/// CONNECT command.
pub const CMD_CONNECT: u8 = 0x01;
/// BIND command.
pub const CMD_BIND: u8 = 0x02;
/// UDP ASSOCIATE command.
pub const CMD_UDP_ASSOCIATE: u8 = 0x03;

/// Successful reply status.
pub const REP_SUCCESS: u8 = 0x00;

/// Authentication method advertised in the greeting and selected in
/// its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks5AuthMethod {
    NoAuth,
    Gssapi,
    Password,
    NoAcceptable,
    /// Any other method byte, preserved for reporting.
    Other(u8),
}

impl Socks5AuthMethod {
    pub fn code(self) -> u8 {
        match self {
            Socks5AuthMethod::NoAuth => AUTH_NONE,
            Socks5AuthMethod::Gssapi => AUTH_GSSAPI,
            Socks5AuthMethod::Password => AUTH_PASSWORD,
            Socks5AuthMethod::NoAcceptable => AUTH_NO_ACCEPTABLE,
            Socks5AuthMethod::Other(code) => code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            AUTH_NONE => Socks5AuthMethod::NoAuth,
            AUTH_GSSAPI => Socks5AuthMethod::Gssapi,
            AUTH_PASSWORD => Socks5AuthMethod::Password,
            AUTH_NO_ACCEPTABLE => Socks5AuthMethod::NoAcceptable,
            other => Socks5AuthMethod::Other(other),
        }
    }
}

impl fmt::Display for Socks5AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Socks5AuthMethod::NoAuth => write!(f, "no authentication"),
            Socks5AuthMethod::Gssapi => write!(f, "GSSAPI"),
            Socks5AuthMethod::Password => write!(f, "username/password"),
            Socks5AuthMethod::NoAcceptable => write!(f, "no acceptable methods"),
            Socks5AuthMethod::Other(code) => write!(f, "method 0x{:02x}", code),
        }
    }
}

/// Command requested of the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks5Command {
    Connect,
    Bind,
    UdpAssociate,
    Other(u8),
}

impl Socks5Command {
    pub fn code(self) -> u8 {
        match self {
            Socks5Command::Connect => CMD_CONNECT,
            Socks5Command::Bind => CMD_BIND,
            Socks5Command::UdpAssociate => CMD_UDP_ASSOCIATE,
            Socks5Command::Other(code) => code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            CMD_CONNECT => Socks5Command::Connect,
            CMD_BIND => Socks5Command::Bind,
            CMD_UDP_ASSOCIATE => Socks5Command::UdpAssociate,
            other => Socks5Command::Other(other),
        }
    }
}

/// Reply status of a command response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks5CommandStatus {
    Success,
    GeneralFailure,
    ConnectionNotAllowed,
    NetworkUnreachable,
    HostUnreachable,
    ConnectionRefused,
    TtlExpired,
    CommandNotSupported,
    AddressTypeNotSupported,
    Other(u8),
}

impl Socks5CommandStatus {
    pub fn code(self) -> u8 {
        match self {
            Socks5CommandStatus::Success => REP_SUCCESS,
            Socks5CommandStatus::GeneralFailure => 0x01,
            Socks5CommandStatus::ConnectionNotAllowed => 0x02,
            Socks5CommandStatus::NetworkUnreachable => 0x03,
            Socks5CommandStatus::HostUnreachable => 0x04,
            Socks5CommandStatus::ConnectionRefused => 0x05,
            Socks5CommandStatus::TtlExpired => 0x06,
            Socks5CommandStatus::CommandNotSupported => 0x07,
            Socks5CommandStatus::AddressTypeNotSupported => 0x08,
            Socks5CommandStatus::Other(code) => code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            REP_SUCCESS => Socks5CommandStatus::Success,
            0x01 => Socks5CommandStatus::GeneralFailure,
            0x02 => Socks5CommandStatus::ConnectionNotAllowed,
            0x03 => Socks5CommandStatus::NetworkUnreachable,
            0x04 => Socks5CommandStatus::HostUnreachable,
            0x05 => Socks5CommandStatus::ConnectionRefused,
            0x06 => Socks5CommandStatus::TtlExpired,
            0x07 => Socks5CommandStatus::CommandNotSupported,
            0x08 => Socks5CommandStatus::AddressTypeNotSupported,
            other => Socks5CommandStatus::Other(other),
        }
    }

    pub fn is_success(self) -> bool {
        self == Socks5CommandStatus::Success
    }
}

impl fmt::Display for Socks5CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Socks5CommandStatus::Success => "succeeded",
            Socks5CommandStatus::GeneralFailure => "general SOCKS server failure",
            Socks5CommandStatus::ConnectionNotAllowed => "connection not allowed by ruleset",
            Socks5CommandStatus::NetworkUnreachable => "network unreachable",
            Socks5CommandStatus::HostUnreachable => "host unreachable",
            Socks5CommandStatus::ConnectionRefused => "connection refused",
            Socks5CommandStatus::TtlExpired => "TTL expired",
            Socks5CommandStatus::CommandNotSupported => "command not supported",
            Socks5CommandStatus::AddressTypeNotSupported => "address type not supported",
            Socks5CommandStatus::Other(code) => return write!(f, "undefined status 0x{:02x}", code),
        };
        f.write_str(text)
    }
}

/// Status of the username/password subnegotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks5PasswordAuthStatus {
    Success,
    /// Any nonzero status byte is a rejection; the byte is kept for
    /// reporting.
    Failure(u8),
}

impl Socks5PasswordAuthStatus {
    pub fn code(self) -> u8 {
        match self {
            Socks5PasswordAuthStatus::Success => 0x00,
            Socks5PasswordAuthStatus::Failure(code) => code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        if code == 0x00 {
            Socks5PasswordAuthStatus::Success
        } else {
            Socks5PasswordAuthStatus::Failure(code)
        }
    }

    pub fn is_success(self) -> bool {
        self == Socks5PasswordAuthStatus::Success
    }
}

/// Client greeting: the auth methods the client is willing to use, in
/// preference order. Duplicate entries are legal and preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks5InitialRequest {
    pub auth_methods: Vec<Socks5AuthMethod>,
}

impl Socks5InitialRequest {
    pub fn new(auth_methods: Vec<Socks5AuthMethod>) -> Self {
        Self { auth_methods }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.auth_methods.len() > 255 {
            return Err(ProxyError::FieldTooLong {
                field: "auth methods",
                len: self.auth_methods.len(),
            });
        }
        out.push(SOCKS5_VERSION);
        out.push(self.auth_methods.len() as u8);
        for method in &self.auth_methods {
            out.push(method.code());
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }
}

impl WireMessage for Socks5InitialRequest {
    fn read_from(r: &mut ByteReader<'_>) -> Result<Self> {
        let version = r.take_u8()?;
        if version != SOCKS5_VERSION {
            return Err(ProxyError::VersionMismatch {
                expected: SOCKS5_VERSION,
                actual: version,
            });
        }
        let count = r.take_u8()? as usize;
        let methods = r.take(count)?;
        Ok(Self {
            auth_methods: methods
                .iter()
                .map(|&code| Socks5AuthMethod::from_code(code))
                .collect(),
        })
    }
}

/// Server's answer to the greeting: the method it selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Socks5InitialResponse {
    pub auth_method: Socks5AuthMethod,
}

impl Socks5InitialResponse {
    pub fn new(auth_method: Socks5AuthMethod) -> Self {
        Self { auth_method }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(SOCKS5_VERSION);
        out.push(self.auth_method.code());
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2);
        self.write_to(&mut out);
        out
    }
}

impl WireMessage for Socks5InitialResponse {
    fn read_from(r: &mut ByteReader<'_>) -> Result<Self> {
        let version = r.take_u8()?;
        if version != SOCKS5_VERSION {
            // An unrecognized first byte means the peer is not talking
            // SOCKS5 at all; no further parse can succeed.
            return Err(ProxyError::VersionMismatch {
                expected: SOCKS5_VERSION,
                actual: version,
            });
        }
        Ok(Self {
            auth_method: Socks5AuthMethod::from_code(r.take_u8()?),
        })
    }
}

/// Username/password subnegotiation request.
///
/// Both fields travel as raw octets behind one-byte length prefixes,
/// so each is limited to 255 bytes; oversize fields are rejected at
/// encode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks5PasswordAuthRequest {
    pub username: String,
    pub password: String,
}

impl Socks5PasswordAuthRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.username.len() > 255 {
            return Err(ProxyError::FieldTooLong {
                field: "username",
                len: self.username.len(),
            });
        }
        if self.password.len() > 255 {
            return Err(ProxyError::FieldTooLong {
                field: "password",
                len: self.password.len(),
            });
        }
        out.push(PASSWORD_AUTH_VERSION);
        out.push(self.username.len() as u8);
        out.extend_from_slice(self.username.as_bytes());
        out.push(self.password.len() as u8);
        out.extend_from_slice(self.password.as_bytes());
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }
}

impl WireMessage for Socks5PasswordAuthRequest {
    fn read_from(r: &mut ByteReader<'_>) -> Result<Self> {
        let version = r.take_u8()?;
        if version != PASSWORD_AUTH_VERSION {
            return Err(ProxyError::VersionMismatch {
                expected: PASSWORD_AUTH_VERSION,
                actual: version,
            });
        }
        // The password length prefix sits behind the username body, so
        // a short buffer aborts here and the retry re-reads from the
        // start; nothing below commits until the whole message parses.
        let ulen = r.take_u8()? as usize;
        let username = String::from_utf8_lossy(r.take(ulen)?).into_owned();
        let plen = r.take_u8()? as usize;
        let password = String::from_utf8_lossy(r.take(plen)?).into_owned();
        Ok(Self { username, password })
    }
}

/// Server's verdict on the subnegotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Socks5PasswordAuthResponse {
    pub status: Socks5PasswordAuthStatus,
}

impl Socks5PasswordAuthResponse {
    pub fn new(status: Socks5PasswordAuthStatus) -> Self {
        Self { status }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(PASSWORD_AUTH_VERSION);
        out.push(self.status.code());
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2);
        self.write_to(&mut out);
        out
    }
}

impl WireMessage for Socks5PasswordAuthResponse {
    fn read_from(r: &mut ByteReader<'_>) -> Result<Self> {
        let version = r.take_u8()?;
        if version != PASSWORD_AUTH_VERSION {
            return Err(ProxyError::VersionMismatch {
                expected: PASSWORD_AUTH_VERSION,
                actual: version,
            });
        }
        Ok(Self {
            status: Socks5PasswordAuthStatus::from_code(r.take_u8()?),
        })
    }
}

/// Command request: what the client asks the proxy to do, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks5CommandRequest {
    pub command: Socks5Command,
    pub dst: Address,
}

impl Socks5CommandRequest {
    pub fn new(command: Socks5Command, dst: Address) -> Self {
        Self { command, dst }
    }

    pub fn connect(dst: Address) -> Self {
        Self::new(Socks5Command::Connect, dst)
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        out.push(SOCKS5_VERSION);
        out.push(self.command.code());
        out.push(RESERVED);
        address::write_address(&self.dst, out)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }
}

impl WireMessage for Socks5CommandRequest {
    fn read_from(r: &mut ByteReader<'_>) -> Result<Self> {
        let version = r.take_u8()?;
        if version != SOCKS5_VERSION {
            return Err(ProxyError::VersionMismatch {
                expected: SOCKS5_VERSION,
                actual: version,
            });
        }
        let command = Socks5Command::from_code(r.take_u8()?);
        // Reserved byte: skipped, not validated.
        r.advance(1)?;
        let dst = address::read_address(r)?;
        Ok(Self { command, dst })
    }
}

/// Command response: the proxy's verdict plus the address it bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks5CommandResponse {
    pub status: Socks5CommandStatus,
    pub bnd: Address,
}

impl Socks5CommandResponse {
    pub fn new(status: Socks5CommandStatus, bnd: Address) -> Self {
        Self { status, bnd }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        out.push(SOCKS5_VERSION);
        out.push(self.status.code());
        out.push(RESERVED);
        address::write_address(&self.bnd, out)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }
}

impl WireMessage for Socks5CommandResponse {
    fn read_from(r: &mut ByteReader<'_>) -> Result<Self> {
        let version = r.take_u8()?;
        if version != SOCKS5_VERSION {
            return Err(ProxyError::VersionMismatch {
                expected: SOCKS5_VERSION,
                actual: version,
            });
        }
        let status = Socks5CommandStatus::from_code(r.take_u8()?);
        r.advance(1)?;
        let bnd = address::read_address(r)?;
        Ok(Self { status, bnd })
    }
}

/// Server-side decoder for the client greeting.
pub type Socks5InitialRequestDecoder = IncrementalDecoder<Socks5InitialRequest>;
/// Client-side decoder for the greeting response.
pub type Socks5InitialResponseDecoder = IncrementalDecoder<Socks5InitialResponse>;
/// Server-side decoder for the subnegotiation request.
pub type Socks5PasswordAuthRequestDecoder = IncrementalDecoder<Socks5PasswordAuthRequest>;
/// Client-side decoder for the subnegotiation response.
pub type Socks5PasswordAuthResponseDecoder = IncrementalDecoder<Socks5PasswordAuthResponse>;
/// Server-side decoder for the command request.
pub type Socks5CommandRequestDecoder = IncrementalDecoder<Socks5CommandRequest>;
/// Client-side decoder for the command response.
pub type Socks5CommandResponseDecoder = IncrementalDecoder<Socks5CommandResponse>;
