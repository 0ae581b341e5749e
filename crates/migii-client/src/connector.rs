use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

use crate::error::{ClientError, Result};

/// Inbound text frames of one open connection. The stream ending means the
/// peer closed; dropping it closes the transport.
pub type TransportStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Opens transports for the reconnect loop.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<TransportStream>;
}

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<TransportStream> {
        let (ws, response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        debug!(url = %self.url, status = %response.status(), "websocket open");

        // Control frames are handled by tungstenite; only text reaches the client.
        let frames = ws.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(_) => None,
                Err(e) => Some(Err(ClientError::Transport(e.to_string()))),
            }
        });
        Ok(frames.boxed())
    }
}
