//! Client protocol for the WebSocket channel
//!
//! Every frame is a JSON object with a `type` tag. Requests and responses
//! share the `exchange/` namespace; pushes reuse the `exchange/bookOrders`
//! response so clients handle both the same way.

use std::collections::BTreeMap;

use common::{BookId, BrandedAmount, Keyword, OrderId, Proposal};
use matching_engine::{BookOrdersView, SubmitOutcome};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientRequest {
    #[serde(rename = "exchange/getBookOrders", rename_all = "camelCase")]
    GetBookOrders {
        #[serde(default)]
        book_id: Option<BookId>,
    },

    #[serde(rename = "exchange/subscribeBookOrders", rename_all = "camelCase")]
    SubscribeBookOrders {
        #[serde(default)]
        book_id: Option<BookId>,
    },

    #[serde(rename = "exchange/unsubscribeBookOrders", rename_all = "camelCase")]
    UnsubscribeBookOrders {
        #[serde(default)]
        book_id: Option<BookId>,
    },

    #[serde(rename = "exchange/submitOrder", rename_all = "camelCase")]
    SubmitOrder {
        #[serde(default)]
        book_id: Option<BookId>,
        #[serde(default)]
        order_id: Option<OrderId>,
        #[serde(default)]
        give: BTreeMap<Keyword, BrandedAmount>,
        #[serde(default)]
        want: BTreeMap<Keyword, BrandedAmount>,
    },
}

impl ClientRequest {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| GatewayError::Protocol(e.to_string()))
    }
}

/// Build the proposal carried by a submit request
pub fn proposal(
    give: BTreeMap<Keyword, BrandedAmount>,
    want: BTreeMap<Keyword, BrandedAmount>,
) -> Proposal {
    Proposal { give, want }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscribeStatus {
    /// Newly subscribed; the current book follows
    Ok,
    /// This connection already follows the book
    Already,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "exchange/bookOrders", rename_all = "camelCase")]
    BookOrders { book_id: BookId, data: BookOrdersView },

    #[serde(rename = "exchange/subscribeBookOrdersResponse", rename_all = "camelCase")]
    SubscribeBookOrdersResponse { book_id: BookId, data: SubscribeStatus },

    #[serde(rename = "exchange/unsubscribeBookOrdersResponse", rename_all = "camelCase")]
    UnsubscribeBookOrdersResponse { book_id: BookId, data: bool },

    #[serde(rename = "exchange/submitOrderResponse", rename_all = "camelCase")]
    SubmitOrderResponse { book_id: BookId, data: SubmitOutcome },

    #[serde(rename = "exchange/error")]
    Error { message: String },
}

impl ServerMessage {
    pub fn error(err: &GatewayError) -> Self {
        ServerMessage::Error {
            message: err.to_string(),
        }
    }

    pub fn to_message(&self) -> Result<Message> {
        Ok(Message::Text(serde_json::to_string(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_submit_without_keys() {
        let request = ClientRequest::parse(r#"{"type":"exchange/submitOrder"}"#).unwrap();
        assert_matches!(
            request,
            ClientRequest::SubmitOrder { book_id: None, order_id: None, give, want }
                if give.is_empty() && want.is_empty()
        );
    }

    #[test]
    fn test_parse_submit_amounts() {
        let request = ClientRequest::parse(
            r#"{
                "type": "exchange/submitOrder",
                "bookId": "simoleans-moola",
                "give": { "Asset": { "brand": "simoleans", "value": "9" } },
                "want": { "Price": { "brand": "moola", "value": 5 } }
            }"#,
        )
        .unwrap();
        let (give, want) = assert_matches!(
            request,
            ClientRequest::SubmitOrder { book_id: Some(_), give, want, .. } => (give, want)
        );
        assert_eq!(
            proposal(give, want).direction(),
            Some(common::Direction::Sell)
        );
    }

    #[test]
    fn test_unknown_type_is_protocol_error() {
        assert_matches!(
            ClientRequest::parse(r#"{"type":"exchange/bogus"}"#),
            Err(GatewayError::Protocol(_))
        );
    }

    #[test]
    fn test_subscribe_response_shape() {
        let message = ServerMessage::SubscribeBookOrdersResponse {
            book_id: "b".to_string(),
            data: SubscribeStatus::Already,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "exchange/subscribeBookOrdersResponse",
                "bookId": "b",
                "data": "already",
            })
        );
    }
}
