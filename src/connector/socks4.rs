//! SOCKS4 proxy connector.

use std::net::TcpStream;
use std::time::Duration;

use log::debug;

use crate::addr::Address;
use crate::connector::{dial, drive, BufferedStream, ProxyConnector, DEFAULT_CONNECT_TIMEOUT};
use crate::error::Result;
use crate::handshake::ProxyHandshake;

#[cfg(feature = "async")]
use crate::connector::{async_dial, async_drive, AsyncProxyConnector};
#[cfg(feature = "async")]
use async_trait::async_trait;
#[cfg(feature = "async")]
use tokio::net::TcpStream as TokioTcpStream;

/// SOCKS4 proxy client.
///
/// Domain destinations are sent with the SOCKS4a hostname extension;
/// IPv6 destinations cannot be expressed and fail at negotiation.
pub struct Socks4Proxy {
    proxy_addr: String,
    user_id: Option<String>,
    timeout: Duration,
}

impl Socks4Proxy {
    pub fn new(proxy_addr: impl Into<String>) -> Self {
        Self {
            proxy_addr: proxy_addr.into(),
            user_id: None,
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Build from a `socks4://[user@]host[:port]` URL. The port
    /// defaults to 1080; a URL username becomes the ident user-id.
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = crate::connector::parse_proxy_url(url, "socks4", 1080)?;
        let mut proxy = Self::new(parsed.addr);
        proxy.user_id = parsed.username;
        Ok(proxy)
    }

    /// Set the ident user-id sent with the request.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the dial and negotiation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn proxy_addr(&self) -> &str {
        &self.proxy_addr
    }

    fn handshake(&self, dst: &Address) -> ProxyHandshake {
        ProxyHandshake::socks4(dst.clone(), self.user_id.clone())
    }
}

impl ProxyConnector for Socks4Proxy {
    fn connect(&self, dst: &Address) -> Result<BufferedStream<TcpStream>> {
        debug!("socks4 proxy {}: tunneling to {}", self.proxy_addr, dst);
        let mut stream = dial(&self.proxy_addr, self.timeout)?;
        let mut handshake = self.handshake(dst);
        let early_data = drive(&mut stream, &mut handshake, self.timeout)?;
        debug!("socks4 proxy {}: tunnel to {} established", self.proxy_addr, dst);
        Ok(BufferedStream::new(stream, early_data))
    }
}

#[cfg(feature = "async")]
#[async_trait]
impl AsyncProxyConnector for Socks4Proxy {
    async fn async_connect(&self, dst: &Address) -> Result<BufferedStream<TokioTcpStream>> {
        debug!("socks4 proxy {}: tunneling to {}", self.proxy_addr, dst);
        let mut stream = async_dial(&self.proxy_addr, self.timeout).await?;
        let mut handshake = self.handshake(dst);
        let early_data = async_drive(&mut stream, &mut handshake, self.timeout).await?;
        debug!("socks4 proxy {}: tunnel to {} established", self.proxy_addr, dst);
        Ok(BufferedStream::new(stream, early_data))
    }
}
