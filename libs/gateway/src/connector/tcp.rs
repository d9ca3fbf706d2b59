//! Line-delimited JSON over TCP

use super::framing::LineFramer;
use super::Link;
use crate::{GatewayError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};
use url::Url;

pub(crate) struct TcpLink {
    stream: TcpStream,
    framer: LineFramer,
}

impl TcpLink {
    pub(crate) async fn dial(url: &Url, connect_timeout: Duration) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| GatewayError::connection("URL has no host", url.as_str()))?;
        let port = url
            .port()
            .ok_or_else(|| GatewayError::connection("URL has no port", url.as_str()))?;

        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                GatewayError::timeout("TCP connect", connect_timeout.as_millis() as u64)
            })?
            .map_err(|e| {
                GatewayError::connection_with_source("Failed to connect", url.as_str(), e)
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        debug!(url = %url, peer = ?stream.peer_addr().ok(), "TCP link established");

        Ok(Self {
            stream,
            framer: LineFramer::new(),
        })
    }
}

#[async_trait]
impl Link for TcpLink {
    async fn write_frame(&mut self, text: &str) -> Result<()> {
        let mut frame = Vec::with_capacity(text.len() + 1);
        frame.extend_from_slice(text.as_bytes());
        frame.push(b'\n');
        self.stream
            .write_all(&frame)
            .await
            .map_err(|e| GatewayError::network_with_source("TCP write failed", e))
    }

    async fn read_frame(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(line) = self.framer.next_line() {
                return Ok(Some(line));
            }
            let n = self
                .stream
                .read_buf(self.framer.buffer_mut())
                .await
                .map_err(|e| GatewayError::network_with_source("TCP read failed", e))?;
            if n == 0 {
                if self.framer.pending() > 0 {
                    debug!(bytes = self.framer.pending(), "Discarding unterminated tail");
                }
                return Ok(None);
            }
        }
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("TCP shutdown: {}", e);
        }
    }
}
