//! WebSocket adapter for the gateway

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use server::{ConnectionId, MessageHandler, Outbound};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, warn};

use crate::gateway::Gateway;
use crate::protocol::{ClientRequest, ServerMessage};

/// Routes WebSocket frames to a [`Gateway`]
pub struct WsHandler {
    gateway: Arc<Gateway>,
}

impl WsHandler {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl MessageHandler for WsHandler {
    async fn handle(&self, conn_id: ConnectionId, message: Message) -> Option<Message> {
        let text = match message {
            Message::Text(text) => text,
            _ => return None,
        };

        let reply = match ClientRequest::parse(&text) {
            Ok(request) => self.gateway.handle_request(conn_id, request).await,
            Err(e) => Err(e),
        };
        let reply = reply.unwrap_or_else(|e| {
            if e.is_client_error() {
                debug!(conn_id, %e, "Request rejected");
            } else {
                warn!(conn_id, %e, "Request failed");
            }
            ServerMessage::error(&e)
        });

        match reply.to_message() {
            Ok(message) => Some(message),
            Err(e) => {
                error!(conn_id, %e, "Failed to encode response");
                None
            }
        }
    }

    async fn on_connect(&self, conn_id: ConnectionId, _peer_addr: SocketAddr, outbound: Outbound) {
        self.gateway.open_session(conn_id, outbound);
    }

    async fn on_disconnect(&self, conn_id: ConnectionId) {
        self.gateway.close_session(conn_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matching_engine::BookRegistry;
    use serde_json::Value;
    use settlement::InMemoryEscrow;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn handler() -> WsHandler {
        let registry = BookRegistry::from_config(
            &config::generate_default_config(),
            Arc::new(InMemoryEscrow::new()),
        );
        WsHandler::new(Gateway::new(Arc::new(registry), CancellationToken::new()))
    }

    async fn ask(handler: &WsHandler, conn_id: ConnectionId, text: &str) -> Value {
        let reply = handler
            .handle(conn_id, Message::Text(text.to_string()))
            .await
            .unwrap();
        serde_json::from_str(reply.to_text().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_over_session() {
        let handler = handler();
        let (tx, mut rx) = mpsc::unbounded_channel();
        handler.on_connect(7, "127.0.0.1:1".parse().unwrap(), tx).await;

        let first = ask(&handler, 7, r#"{"type":"exchange/subscribeBookOrders"}"#).await;
        assert_eq!(first["data"], "ok");
        let second = ask(&handler, 7, r#"{"type":"exchange/subscribeBookOrders"}"#).await;
        assert_eq!(second["data"], "already");

        let pushed = rx.recv().await.unwrap();
        let pushed: Value = serde_json::from_str(pushed.to_text().unwrap()).unwrap();
        assert_eq!(pushed["type"], "exchange/bookOrders");
        assert_eq!(pushed["data"]["changeToken"], 0);
    }

    #[tokio::test]
    async fn test_subscribe_without_session_fails() {
        let handler = handler();
        let reply = ask(&handler, 9, r#"{"type":"exchange/subscribeBookOrders"}"#).await;
        assert_eq!(reply["type"], "exchange/error");
        assert!(reply["message"].as_str().unwrap().contains("not initialised"));
    }

    #[tokio::test]
    async fn test_garbage_and_binary_frames() {
        let handler = handler();
        let reply = ask(&handler, 1, "not json").await;
        assert_eq!(reply["type"], "exchange/error");
        assert!(handler.handle(1, Message::Binary(vec![1, 2])).await.is_none());
    }

    #[tokio::test]
    async fn test_submit_roundtrip() {
        let handler = handler();
        let reply = ask(
            &handler,
            1,
            r#"{
                "type": "exchange/submitOrder",
                "give": { "Asset": { "brand": "simoleans", "value": "9" } },
                "want": { "Price": { "brand": "moola", "value": "5" } }
            }"#,
        )
        .await;
        assert_eq!(reply["type"], "exchange/submitOrderResponse");
        assert_eq!(reply["data"]["accepted"], true);

        let book = ask(&handler, 1, r#"{"type":"exchange/getBookOrders"}"#).await;
        assert_eq!(book["data"]["sell"][0]["Asset"]["amount"], "9");
        assert_eq!(book["data"]["sell"][0]["Asset"]["keyword"], "simoleans");
    }
}
