use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use uuid::Uuid;

use parley_types::events::{GatewayCommand, GatewayEvent};

use crate::error::ClientError;

/// How long the server gets to answer `Identify` with `Ready`.
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// An identified gateway connection.
pub struct GatewayClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    user_id: Uuid,
}

impl GatewayClient {
    /// Connect to `ws_url` (e.g. `ws://host:3000/gateway`) and identify
    /// with `token`. Returns once the server has sent `Ready`.
    pub async fn connect(ws_url: &str, token: &str) -> Result<Self, ClientError> {
        let (ws, _) = tokio_tungstenite::connect_async(ws_url).await?;
        let mut client = Self { ws, user_id: Uuid::nil() };

        client
            .send(&GatewayCommand::Identify { token: token.to_string() })
            .await?;

        let ready = tokio::time::timeout(READY_TIMEOUT, client.next_event())
            .await
            .map_err(|_| ClientError::Handshake("timed out waiting for Ready".into()))??;

        match ready {
            Some(GatewayEvent::Ready { user_id, name }) => {
                debug!("Gateway ready for {} ({})", name, user_id);
                client.user_id = user_id;
                Ok(client)
            }
            Some(other) => Err(ClientError::Handshake(format!("expected Ready, got {:?}", other))),
            None => Err(ClientError::Handshake("connection closed before Ready".into())),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Join the channels of these chats, replacing earlier subscriptions.
    pub async fn subscribe(&mut self, chat_ids: Vec<Uuid>) -> Result<(), ClientError> {
        self.send(&GatewayCommand::Subscribe { chat_ids }).await
    }

    pub async fn start_typing(&mut self, chat_id: Uuid) -> Result<(), ClientError> {
        self.send(&GatewayCommand::StartTyping { chat_id }).await
    }

    pub async fn stop_typing(&mut self, chat_id: Uuid) -> Result<(), ClientError> {
        self.send(&GatewayCommand::StopTyping { chat_id }).await
    }

    /// Next event from the server. `None` once the connection is closed.
    /// Pings are answered by the socket itself.
    pub async fn next_event(&mut self) -> Result<Option<GatewayEvent>, ClientError> {
        while let Some(msg) = self.ws.next().await {
            match msg? {
                Message::Text(text) => match serde_json::from_str::<GatewayEvent>(text.as_str()) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => warn!("Unknown gateway event: {}", e),
                },
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.ws.close(None).await?;
        Ok(())
    }

    async fn send(&mut self, cmd: &GatewayCommand) -> Result<(), ClientError> {
        let text = serde_json::to_string(cmd)?;
        self.ws.send(Message::Text(text.into())).await?;
        Ok(())
    }
}
