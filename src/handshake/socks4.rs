//! SOCKS4 handshake driver: one request, one 8-byte reply.

use crate::addr::Address;
use crate::codec::socks4::{Socks4CommandRequest, Socks4ResponseDecoder};
use crate::codec::DecodeStatus;
use crate::error::{ProxyError, Result};
use crate::handshake::{HandshakeState, Step};

pub(crate) struct Socks4Driver {
    request: Socks4CommandRequest,
    decoder: Socks4ResponseDecoder,
}

impl Socks4Driver {
    pub(crate) fn new(dst: Address, user_id: Option<String>) -> Self {
        let mut request = Socks4CommandRequest::connect(dst);
        if let Some(user_id) = user_id {
            request = request.with_user_id(user_id);
        }
        Self {
            request,
            decoder: Socks4ResponseDecoder::new(),
        }
    }

    pub(crate) fn start(&mut self) -> Result<(Vec<u8>, HandshakeState)> {
        Ok((
            self.request.to_bytes()?,
            HandshakeState::AwaitingCommandResponse,
        ))
    }

    pub(crate) fn receive(&mut self, chunk: &[u8]) -> Result<Step> {
        match self.decoder.feed(chunk) {
            DecodeStatus::NeedMore => Ok(Step::Pending),
            DecodeStatus::Complete { message, trailing } => {
                if message.status.is_granted() {
                    Ok(Step::Done {
                        send: Vec::new(),
                        trailing,
                    })
                } else {
                    Err(ProxyError::Socks4Rejected(message.status))
                }
            }
            DecodeStatus::Failed { error } => Err(error),
            DecodeStatus::Passthrough { .. } | DecodeStatus::Discarded => {
                Err(ProxyError::AlreadyFinished)
            }
        }
    }
}
