//! Proxy handshake orchestration.
//!
//! [`ProxyHandshake`] runs the client side of a proxy negotiation
//! without touching a socket. The caller owns the transport and feeds
//! events in:
//!
//! - `connected()` once the TCP connection is up
//! - `receive()` for every chunk read from the proxy
//! - `deadline_exceeded()` / `transport_closed()` when the caller's
//!   timer fires or the peer goes away
//!
//! Each event answers with a [`Progress`] value carrying the bytes to
//! transmit, the established tunnel's early payload, or the failure.
//! Application writes submitted mid-negotiation are queued and
//! released in order when the tunnel comes up; they are never sent
//! speculatively. On failure every queued write is handed back exactly
//! once.

use std::fmt;

use log::debug;

use crate::addr::Address;
use crate::codec::http::HttpConnectRequest;
use crate::error::{ProxyError, Result};

mod http;
mod socks4;
mod socks5;

use http::HttpDriver;
use socks4::Socks4Driver;
use socks5::Socks5Driver;

/// Where the negotiation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Constructed, transport not yet reported connected.
    Idle,
    /// SOCKS5 greeting sent, waiting for the method selection.
    AwaitingGreetingResponse,
    /// Username/password subnegotiation sent, waiting for the verdict.
    AwaitingAuthResponse,
    /// Command (or CONNECT request) sent, waiting for the reply.
    AwaitingCommandResponse,
    /// Tunnel established.
    Success,
    /// Negotiation failed; the handshake is inert.
    Failed,
}

impl HandshakeState {
    /// True once the handshake reached `Success` or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, HandshakeState::Success | HandshakeState::Failed)
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            HandshakeState::Idle => "idle",
            HandshakeState::AwaitingGreetingResponse => "awaiting greeting response",
            HandshakeState::AwaitingAuthResponse => "awaiting auth response",
            HandshakeState::AwaitingCommandResponse => "awaiting command response",
            HandshakeState::Success => "success",
            HandshakeState::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// Outcome of a handshake event.
#[derive(Debug)]
pub enum Progress {
    /// Negotiation continues. Transmit `send` to the proxy if present.
    Negotiating { send: Option<Vec<u8>> },
    /// The tunnel is up. `early_data` is payload the proxy delivered
    /// behind its final response; `pending_writes` are the bytes to
    /// transmit now, in order (any final handshake bytes first, then
    /// the queued application writes).
    Established {
        early_data: Vec<u8>,
        pending_writes: Vec<Vec<u8>>,
    },
    /// Negotiation failed. `failed_writes` returns every queued
    /// application write, each exactly once.
    Failed {
        error: ProxyError,
        failed_writes: Vec<Vec<u8>>,
    },
}

/// What became of a write submitted through [`ProxyHandshake::enqueue_write`].
#[derive(Debug, PartialEq, Eq)]
pub enum WriteDisposition {
    /// Held until the negotiation settles.
    Queued,
    /// The tunnel is already up; transmit the payload directly.
    PassThrough(Vec<u8>),
}

/// A driver's answer to one chunk of proxy bytes.
pub(crate) enum Step {
    /// Waiting for more bytes; nothing to transmit.
    Pending,
    /// Transmit `data` and move to `next`.
    Send { data: Vec<u8>, next: HandshakeState },
    /// Negotiation finished. `send` is any final request bytes that
    /// still must reach the proxy (pipelined responses can settle the
    /// handshake before they were transmitted); `trailing` is early
    /// tunnel payload.
    Done { send: Vec<u8>, trailing: Vec<u8> },
}

/// FIFO of application writes held back until the tunnel settles.
#[derive(Debug, Default)]
struct OutboundQueue {
    items: Vec<Vec<u8>>,
}

impl OutboundQueue {
    fn push(&mut self, payload: Vec<u8>) {
        self.items.push(payload);
    }

    /// Hands every item back in submission order, leaving the queue
    /// empty. Each write moves out exactly once.
    fn drain(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.items)
    }
}

enum Driver {
    Socks4(Socks4Driver),
    Socks5(Socks5Driver),
    Http(HttpDriver),
}

impl Driver {
    fn start(&mut self) -> Result<(Vec<u8>, HandshakeState)> {
        match self {
            Driver::Socks4(d) => d.start(),
            Driver::Socks5(d) => d.start(),
            Driver::Http(d) => d.start(),
        }
    }

    fn receive(&mut self, chunk: &[u8]) -> Result<Step> {
        match self {
            Driver::Socks4(d) => d.receive(chunk),
            Driver::Socks5(d) => d.receive(chunk),
            Driver::Http(d) => d.receive(chunk),
        }
    }
}

/// Client-side proxy negotiation, decoupled from any transport.
pub struct ProxyHandshake {
    driver: Driver,
    state: HandshakeState,
    queue: OutboundQueue,
}

impl ProxyHandshake {
    /// SOCKS4 CONNECT to `dst`, optionally identifying as `user_id`.
    /// Domain destinations use the SOCKS4a extension.
    pub fn socks4(dst: Address, user_id: Option<String>) -> Self {
        Self::with_driver(Driver::Socks4(Socks4Driver::new(dst, user_id)))
    }

    /// SOCKS5 CONNECT to `dst`. Username/password authentication is
    /// offered only when both credentials are given.
    pub fn socks5(dst: Address, username: Option<String>, password: Option<String>) -> Self {
        Self::with_driver(Driver::Socks5(Socks5Driver::new(dst, username, password)))
    }

    /// HTTP CONNECT using a prepared request.
    pub fn http_connect(request: HttpConnectRequest) -> Self {
        Self::with_driver(Driver::Http(HttpDriver::new(request)))
    }

    fn with_driver(driver: Driver) -> Self {
        Self {
            driver,
            state: HandshakeState::Idle,
            queue: OutboundQueue::default(),
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The transport is up: produce the opening request.
    ///
    /// Valid exactly once, before any other event. Returns
    /// [`ProxyError::AlreadyFinished`] afterwards.
    pub fn connected(&mut self) -> Result<Progress> {
        if self.state != HandshakeState::Idle {
            return Err(ProxyError::AlreadyFinished);
        }
        match self.driver.start() {
            Ok((send, next)) => {
                self.state = next;
                Ok(Progress::Negotiating { send: Some(send) })
            }
            Err(error) => Ok(self.fail(error)),
        }
    }

    /// Feed bytes read from the proxy.
    ///
    /// Partial messages are buffered internally; feeding one byte at a
    /// time gives the same outcome as feeding whole messages. After a
    /// terminal state this is misuse and returns
    /// [`ProxyError::AlreadyFinished`].
    pub fn receive(&mut self, chunk: &[u8]) -> Result<Progress> {
        match self.state {
            HandshakeState::Success | HandshakeState::Failed => {
                return Err(ProxyError::AlreadyFinished);
            }
            HandshakeState::Idle => {
                // The proxy cannot legally speak before our opening
                // request exists.
                return Ok(self.fail(ProxyError::MalformedMessage(
                    "received proxy data before the handshake started".to_string(),
                )));
            }
            _ => {}
        }

        match self.driver.receive(chunk) {
            Ok(Step::Pending) => Ok(Progress::Negotiating { send: None }),
            Ok(Step::Send { data, next }) => {
                self.state = next;
                Ok(Progress::Negotiating { send: Some(data) })
            }
            Ok(Step::Done { send, trailing }) => {
                self.state = HandshakeState::Success;
                debug!(
                    "proxy handshake complete, {} early byte(s)",
                    trailing.len()
                );
                let mut pending_writes = Vec::new();
                if !send.is_empty() {
                    pending_writes.push(send);
                }
                pending_writes.extend(self.queue.drain());
                Ok(Progress::Established {
                    early_data: trailing,
                    pending_writes,
                })
            }
            Err(error) => Ok(self.fail(error)),
        }
    }

    /// Submit an application write. Before the tunnel is up the
    /// payload is queued; afterwards it passes straight through.
    pub fn enqueue_write(&mut self, payload: impl Into<Vec<u8>>) -> Result<WriteDisposition> {
        match self.state {
            HandshakeState::Failed => Err(ProxyError::AlreadyFinished),
            HandshakeState::Success => Ok(WriteDisposition::PassThrough(payload.into())),
            _ => {
                self.queue.push(payload.into());
                Ok(WriteDisposition::Queued)
            }
        }
    }

    /// The caller's negotiation timer fired.
    pub fn deadline_exceeded(&mut self) -> Result<Progress> {
        if self.state.is_terminal() {
            return Err(ProxyError::AlreadyFinished);
        }
        Ok(self.fail(ProxyError::Timeout))
    }

    /// The transport closed before the negotiation settled.
    pub fn transport_closed(&mut self) -> Result<Progress> {
        if self.state.is_terminal() {
            return Err(ProxyError::AlreadyFinished);
        }
        Ok(self.fail(ProxyError::Disconnected))
    }

    fn fail(&mut self, error: ProxyError) -> Progress {
        debug!("proxy handshake failed in state {}: {}", self.state, error);
        self.state = HandshakeState::Failed;
        Progress::Failed {
            error,
            failed_writes: self.queue.drain(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::Address;

    fn started_socks5() -> ProxyHandshake {
        let dst = Address::domain("example.com", 443).unwrap();
        let mut hs = ProxyHandshake::socks5(dst, None, None);
        match hs.connected().unwrap() {
            Progress::Negotiating { send: Some(_) } => hs,
            other => panic!("expected opening send, got {:?}", other),
        }
    }

    #[test]
    fn test_connected_only_once() {
        let mut hs = started_socks5();
        assert!(matches!(
            hs.connected().unwrap_err(),
            ProxyError::AlreadyFinished
        ));
    }

    #[test]
    fn test_receive_before_connected_is_protocol_failure() {
        let dst = Address::domain("example.com", 443).unwrap();
        let mut hs = ProxyHandshake::socks5(dst, None, None);
        match hs.receive(&[0x05, 0x00]).unwrap() {
            Progress::Failed { error, .. } => {
                assert!(matches!(error, ProxyError::MalformedMessage(_)));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert_eq!(hs.state(), HandshakeState::Failed);
    }

    #[test]
    fn test_writes_queue_until_established() {
        let mut hs = started_socks5();
        assert_eq!(
            hs.enqueue_write(b"first".to_vec()).unwrap(),
            WriteDisposition::Queued
        );
        assert_eq!(
            hs.enqueue_write(b"second".to_vec()).unwrap(),
            WriteDisposition::Queued
        );

        // Method selection, then a successful command response.
        match hs.receive(&[0x05, 0x00]).unwrap() {
            Progress::Negotiating { send: Some(_) } => {}
            other => panic!("expected command send, got {:?}", other),
        }
        match hs
            .receive(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0x00, 0x00])
            .unwrap()
        {
            Progress::Established {
                early_data,
                pending_writes,
            } => {
                assert!(early_data.is_empty());
                assert_eq!(pending_writes, vec![b"first".to_vec(), b"second".to_vec()]);
            }
            other => panic!("expected Established, got {:?}", other),
        }

        // Later writes skip the queue entirely.
        assert_eq!(
            hs.enqueue_write(b"third".to_vec()).unwrap(),
            WriteDisposition::PassThrough(b"third".to_vec())
        );
    }

    #[test]
    fn test_deadline_fails_queued_writes_exactly_once() {
        let mut hs = started_socks5();
        hs.enqueue_write(b"held".to_vec()).unwrap();

        match hs.deadline_exceeded().unwrap() {
            Progress::Failed {
                error,
                failed_writes,
            } => {
                assert!(error.is_timeout());
                assert_eq!(failed_writes, vec![b"held".to_vec()]);
            }
            other => panic!("expected Failed, got {:?}", other),
        }

        // A second timer event is misuse, and the writes are gone.
        assert!(matches!(
            hs.deadline_exceeded().unwrap_err(),
            ProxyError::AlreadyFinished
        ));
        assert!(matches!(
            hs.enqueue_write(b"late".to_vec()).unwrap_err(),
            ProxyError::AlreadyFinished
        ));
    }

    #[test]
    fn test_transport_closed_mid_negotiation() {
        let mut hs = started_socks5();
        match hs.transport_closed().unwrap() {
            Progress::Failed { error, .. } => {
                assert!(matches!(error, ProxyError::Disconnected));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn test_receive_after_terminal_is_misuse() {
        let mut hs = started_socks5();
        hs.deadline_exceeded().unwrap();
        assert!(matches!(
            hs.receive(&[0x05]).unwrap_err(),
            ProxyError::AlreadyFinished
        ));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(
            HandshakeState::AwaitingGreetingResponse.to_string(),
            "awaiting greeting response"
        );
        assert_eq!(HandshakeState::Success.to_string(), "success");
    }
}
