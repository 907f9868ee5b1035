//! Incremental wire codecs.
//!
//! Every handshake message decodes through the same one-shot shape: an
//! [`IncrementalDecoder`] accumulates fed bytes until one full message
//! is present, emits it together with any trailing payload, then
//! degrades to a transparent forwarder. A malformed message pushes the
//! decoder into a terminal discard state instead; the failure cause is
//! surfaced exactly once.
//!
//! Message parsers are pure functions over a scratch [`ByteReader`].
//! Running out of bytes mid-parse raises the in-band `Truncated`
//! signal, the reader is thrown away, and the buffered bytes stay
//! untouched for the next feed, so a short read can never half-consume
//! a message.

use std::marker::PhantomData;

use crate::error::{ProxyError, Result};

pub mod address;
pub mod http;
pub mod socks4;
pub mod socks5;

/// Read-only cursor over buffered input.
///
/// All reads are bounds-checked; reading past the end yields
/// [`ProxyError::Truncated`], which incremental decoding treats as
/// "wait for more input", not as a failure.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// The unconsumed tail, without advancing.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn take_u8(&mut self) -> Result<u8> {
        let byte = *self.buf.get(self.pos).ok_or(ProxyError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    /// Big-endian, as every port field on these wires is.
    pub fn take_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(ProxyError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn advance(&mut self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(ProxyError::Truncated);
        }
        self.pos += n;
        Ok(())
    }
}

/// A message that can be parsed off a [`ByteReader`].
///
/// Implementations read exactly one message and must not inspect bytes
/// past its end; `Err(Truncated)` means the buffer holds a prefix of a
/// valid message, any other error means the bytes can never become one.
pub trait WireMessage: Sized {
    fn read_from(r: &mut ByteReader<'_>) -> Result<Self>;
}

/// Outcome of feeding one chunk to an [`IncrementalDecoder`].
#[derive(Debug)]
pub enum DecodeStatus<M> {
    /// Not enough buffered input for a full message; nothing was
    /// consumed, feeding more later picks up where this left off.
    NeedMore,
    /// The single message this decoder exists for. `trailing` holds
    /// bytes that arrived past the message boundary; they are
    /// application payload, not protocol structure.
    Complete { message: M, trailing: Vec<u8> },
    /// The buffered bytes can never form a valid message. Reported
    /// once; the decoder discards everything from here on.
    Failed { error: ProxyError },
    /// The message was already decoded on this instance; the whole
    /// chunk passes through unmodified.
    Passthrough { payload: Vec<u8> },
    /// The decoder already failed; the chunk was dropped.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Done,
    Failed,
}

/// One-shot incremental decoder for a single message type.
///
/// Feed it chunks as they arrive off the transport; it buffers until a
/// whole message is present and never consumes a partial one. After
/// its one message (or one failure) it stops interpreting bytes.
#[derive(Debug)]
pub struct IncrementalDecoder<M> {
    buf: Vec<u8>,
    phase: Phase,
    _marker: PhantomData<M>,
}

impl<M> Default for IncrementalDecoder<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> IncrementalDecoder<M> {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            phase: Phase::Init,
            _marker: PhantomData,
        }
    }

    /// Bytes currently buffered awaiting a complete message.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// True once the decoder has emitted its message or failed.
    pub fn finished(&self) -> bool {
        self.phase != Phase::Init
    }
}

impl<M: WireMessage> IncrementalDecoder<M> {
    pub fn feed(&mut self, chunk: &[u8]) -> DecodeStatus<M> {
        match self.phase {
            Phase::Done => {
                return DecodeStatus::Passthrough {
                    payload: chunk.to_vec(),
                }
            }
            Phase::Failed => return DecodeStatus::Discarded,
            Phase::Init => {}
        }
        self.buf.extend_from_slice(chunk);

        let attempt = {
            let mut r = ByteReader::new(&self.buf);
            M::read_from(&mut r).map(|message| (message, r.consumed()))
        };
        match attempt {
            Ok((message, consumed)) => {
                let trailing = self.buf.split_off(consumed);
                self.buf = Vec::new();
                self.phase = Phase::Done;
                DecodeStatus::Complete { message, trailing }
            }
            Err(ProxyError::Truncated) => DecodeStatus::NeedMore,
            Err(error) => {
                self.buf = Vec::new();
                self.phase = Phase::Failed;
                DecodeStatus::Failed { error }
            }
        }
    }
}
