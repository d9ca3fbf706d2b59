//! JSON text frames over WebSocket

use super::Link;
use crate::{GatewayError, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) struct WsLink {
    stream: WsStream,
}

impl WsLink {
    pub(crate) async fn dial(url: &Url, connect_timeout: Duration) -> Result<Self> {
        let (stream, response) = tokio::time::timeout(connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                GatewayError::timeout("WebSocket connect", connect_timeout.as_millis() as u64)
            })?
            .map_err(|e| {
                GatewayError::connection_with_source("WebSocket handshake failed", url.as_str(), e)
            })?;
        debug!(url = %url, status = %response.status(), "WebSocket link established");
        Ok(Self { stream })
    }
}

#[async_trait]
impl Link for WsLink {
    async fn write_frame(&mut self, text: &str) -> Result<()> {
        self.stream
            .send(Message::Text(format!("{}\n", text)))
            .await
            .map_err(|e| GatewayError::network_with_source("WebSocket write failed", e))
    }

    async fn read_frame(&mut self) -> Result<Option<String>> {
        while let Some(msg) = self.stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let text = text.trim_end_matches(&['\n', '\r'][..]);
                    if !text.is_empty() {
                        return Ok(Some(text.to_string()));
                    }
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "WebSocket closed by peer");
                    return Ok(None);
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(GatewayError::network_with_source("WebSocket read failed", e));
                }
            }
        }
        Ok(None)
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("WebSocket close: {}", e);
        }
    }
}
