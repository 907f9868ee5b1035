//! SOCKS5 handshake driver: greeting, optional username/password
//! subnegotiation, then the CONNECT command.

use crate::addr::Address;
use crate::codec::socks5::{
    Socks5AuthMethod, Socks5CommandRequest, Socks5CommandResponseDecoder, Socks5InitialRequest,
    Socks5InitialResponseDecoder, Socks5PasswordAuthRequest, Socks5PasswordAuthResponseDecoder,
};
use crate::codec::DecodeStatus;
use crate::error::{ProxyError, Result};
use crate::handshake::{HandshakeState, Step};

enum Socks5Phase {
    Greeting(Socks5InitialResponseDecoder),
    Auth(Socks5PasswordAuthResponseDecoder),
    Command(Socks5CommandResponseDecoder),
}

pub(crate) struct Socks5Driver {
    dst: Address,
    username: Option<String>,
    password: Option<String>,
    phase: Socks5Phase,
}

impl Socks5Driver {
    pub(crate) fn new(dst: Address, username: Option<String>, password: Option<String>) -> Self {
        Self {
            dst,
            username,
            password,
            phase: Socks5Phase::Greeting(Socks5InitialResponseDecoder::new()),
        }
    }

    fn offered_methods(&self) -> Vec<Socks5AuthMethod> {
        if self.username.is_some() && self.password.is_some() {
            vec![Socks5AuthMethod::NoAuth, Socks5AuthMethod::Password]
        } else {
            vec![Socks5AuthMethod::NoAuth]
        }
    }

    pub(crate) fn start(&mut self) -> Result<(Vec<u8>, HandshakeState)> {
        let greeting = Socks5InitialRequest::new(self.offered_methods()).to_bytes()?;
        Ok((greeting, HandshakeState::AwaitingGreetingResponse))
    }

    /// Runs decoders phase by phase. Bytes trailing a completed
    /// response feed straight into the next phase's decoder, so a
    /// single chunk can advance the handshake several rounds. Requests
    /// produced along the way pile up in one send.
    pub(crate) fn receive(&mut self, chunk: &[u8]) -> Result<Step> {
        let mut input = chunk.to_vec();
        let mut send = Vec::new();

        loop {
            match &mut self.phase {
                Socks5Phase::Greeting(decoder) => match decoder.feed(&input) {
                    DecodeStatus::NeedMore => {
                        return Ok(pending_or_send(
                            send,
                            HandshakeState::AwaitingGreetingResponse,
                        ));
                    }
                    DecodeStatus::Complete { message, trailing } => {
                        input = trailing;
                        match message.auth_method {
                            Socks5AuthMethod::NoAuth => {
                                Socks5CommandRequest::connect(self.dst.clone())
                                    .write_to(&mut send)?;
                                self.phase =
                                    Socks5Phase::Command(Socks5CommandResponseDecoder::new());
                            }
                            Socks5AuthMethod::Password => {
                                let (username, password) =
                                    match (self.username.clone(), self.password.clone()) {
                                        (Some(u), Some(p)) => (u, p),
                                        _ => {
                                            return Err(ProxyError::UnexpectedAuthMethod(
                                                Socks5AuthMethod::Password,
                                            ));
                                        }
                                    };
                                Socks5PasswordAuthRequest::new(username, password)
                                    .write_to(&mut send)?;
                                self.phase =
                                    Socks5Phase::Auth(Socks5PasswordAuthResponseDecoder::new());
                            }
                            Socks5AuthMethod::NoAcceptable => {
                                return Err(ProxyError::NoAcceptableAuth);
                            }
                            other => return Err(ProxyError::UnexpectedAuthMethod(other)),
                        }
                    }
                    DecodeStatus::Failed { error } => return Err(error),
                    DecodeStatus::Passthrough { .. } | DecodeStatus::Discarded => {
                        return Err(ProxyError::AlreadyFinished);
                    }
                },
                Socks5Phase::Auth(decoder) => match decoder.feed(&input) {
                    DecodeStatus::NeedMore => {
                        return Ok(pending_or_send(send, HandshakeState::AwaitingAuthResponse));
                    }
                    DecodeStatus::Complete { message, trailing } => {
                        if !message.status.is_success() {
                            return Err(ProxyError::AuthFailed(message.status.code()));
                        }
                        input = trailing;
                        Socks5CommandRequest::connect(self.dst.clone()).write_to(&mut send)?;
                        self.phase = Socks5Phase::Command(Socks5CommandResponseDecoder::new());
                    }
                    DecodeStatus::Failed { error } => return Err(error),
                    DecodeStatus::Passthrough { .. } | DecodeStatus::Discarded => {
                        return Err(ProxyError::AlreadyFinished);
                    }
                },
                Socks5Phase::Command(decoder) => match decoder.feed(&input) {
                    DecodeStatus::NeedMore => {
                        return Ok(pending_or_send(
                            send,
                            HandshakeState::AwaitingCommandResponse,
                        ));
                    }
                    DecodeStatus::Complete { message, trailing } => {
                        if !message.status.is_success() {
                            return Err(ProxyError::Socks5CommandFailed(message.status));
                        }
                        return Ok(Step::Done { send, trailing });
                    }
                    DecodeStatus::Failed { error } => return Err(error),
                    DecodeStatus::Passthrough { .. } | DecodeStatus::Discarded => {
                        return Err(ProxyError::AlreadyFinished);
                    }
                },
            }
        }
    }
}

/// An empty send means no phase boundary was crossed, so the caller's
/// state is already right.
fn pending_or_send(send: Vec<u8>, next: HandshakeState) -> Step {
    if send.is_empty() {
        Step::Pending
    } else {
        Step::Send { data: send, next }
    }
}
