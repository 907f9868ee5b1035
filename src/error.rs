use thiserror::Error;

use crate::codec::http::ResponseHead;
use crate::codec::socks4::Socks4CommandStatus;
use crate::codec::socks5::{Socks5AuthMethod, Socks5CommandStatus};

/// Proxy traversal error types
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Not a failure in itself: a message parser ran out of bytes.
    /// The incremental decoders translate this into `NeedMore` and
    /// retry once more input arrives; it never escapes a public API.
    #[error("Truncated message: need more bytes")]
    Truncated,

    #[error("Protocol version mismatch: expected 0x{expected:02x}, got 0x{actual:02x}")]
    VersionMismatch { expected: u8, actual: u8 },

    #[error("Unsupported address type: 0x{0:02x}")]
    UnsupportedAddressType(u8),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Port out of range: {0}")]
    PortOutOfRange(String),

    #[error("Oversized field: {field} is {len} bytes (limit 255)")]
    FieldTooLong { field: &'static str, len: usize },

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("SOCKS4 request rejected: {0}")]
    Socks4Rejected(Socks4CommandStatus),

    #[error("SOCKS5 command failed: {0}")]
    Socks5CommandFailed(Socks5CommandStatus),

    #[error("No acceptable authentication method offered by proxy")]
    NoAcceptableAuth,

    #[error("Proxy selected an auth method that was not offered: {0}")]
    UnexpectedAuthMethod(Socks5AuthMethod),

    #[error("Authentication rejected by proxy (status 0x{0:02x})")]
    AuthFailed(u8),

    #[error("HTTP proxy refused CONNECT: {} {}", .0.status, .0.reason)]
    HttpRejected(ResponseHead),

    #[error("Handshake timed out")]
    Timeout,

    #[error("Connection closed before handshake completed")]
    Disconnected,

    #[error("Handshake already finished")]
    AlreadyFinished,

    #[error("Invalid proxy URL: {0}")]
    InvalidProxyUrl(String),

    #[error("Failed to connect to proxy {proxy}: {source}")]
    ConnectFailed {
        proxy: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProxyError {
    /// True when the proxy actively refused the request (as opposed to
    /// transport trouble or local misuse).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ProxyError::Socks4Rejected(_)
                | ProxyError::Socks5CommandFailed(_)
                | ProxyError::NoAcceptableAuth
                | ProxyError::UnexpectedAuthMethod(_)
                | ProxyError::AuthFailed(_)
                | ProxyError::HttpRejected(_)
        )
    }

    /// True for the handshake-deadline cause.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProxyError::Timeout)
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_errors_are_matchable() {
        // Consumers should be able to programmatically match error
        // variants instead of parsing error message strings.
        let err = ProxyError::Socks5CommandFailed(Socks5CommandStatus::HostUnreachable);
        match &err {
            ProxyError::Socks5CommandFailed(status) => {
                assert!(matches!(status, Socks5CommandStatus::HostUnreachable));
            }
            _ => panic!("expected Socks5CommandFailed"),
        }
        assert!(err.is_rejection());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_socks4_rejection_display_names_status() {
        let err = ProxyError::Socks4Rejected(Socks4CommandStatus::IdentdUnreachable);
        let display = format!("{}", err);
        assert!(display.contains("identd"), "got: {}", display);
    }

    #[test]
    fn test_version_mismatch_display_is_hex() {
        let err = ProxyError::VersionMismatch {
            expected: 0x05,
            actual: 0x47,
        };
        let display = format!("{}", err);
        assert!(display.contains("0x05"), "got: {}", display);
        assert!(display.contains("0x47"), "got: {}", display);
    }

    #[test]
    fn test_timeout_is_not_a_rejection() {
        let err = ProxyError::Timeout;
        assert!(err.is_timeout());
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_io_error_converts() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe").into())
        }
        match fails() {
            Err(ProxyError::IoError(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe);
            }
            other => panic!("expected IoError, got {:?}", other),
        }
    }
}
