//! API handlers for gateway HTTP endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::OrderId;
use matching_engine::{BookOrdersView, MatchingError, OrderView, SubmitOutcome};
use settlement::SettlementError;

use crate::api::models::*;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::protocol;

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            GatewayError::Matching(MatchingError::InvalidProposal(_)) => (StatusCode::BAD_REQUEST, "INVALID_PROPOSAL"),
            GatewayError::Matching(MatchingError::BookNotFound(_)) => (StatusCode::NOT_FOUND, "BOOK_NOT_FOUND"),
            GatewayError::Matching(MatchingError::OrderNotFound(_)) => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
            GatewayError::Matching(MatchingError::DuplicateOrder(_)) => (StatusCode::CONFLICT, "DUPLICATE_ORDER"),
            GatewayError::Matching(MatchingError::Settlement(SettlementError::OrderNotActive(_))) => {
                (StatusCode::CONFLICT, "ORDER_NOT_ACTIVE")
            }
            GatewayError::Matching(MatchingError::Settlement(_)) => (StatusCode::BAD_GATEWAY, "SETTLEMENT_FAILED"),
            GatewayError::Matching(MatchingError::NotifierClosed) => (StatusCode::SERVICE_UNAVAILABLE, "SHUTTING_DOWN"),
            GatewayError::BookMismatch { .. } => (StatusCode::BAD_REQUEST, "BOOK_MISMATCH"),
            GatewayError::MissingBook => (StatusCode::BAD_REQUEST, "MISSING_BOOK"),
            GatewayError::Protocol(_) => (StatusCode::BAD_REQUEST, "PROTOCOL_ERROR"),
            GatewayError::SubscriptionState(_) => (StatusCode::CONFLICT, "SUBSCRIPTION_STATE"),
            GatewayError::ConnectionClosed(_) => (StatusCode::GONE, "CONNECTION_CLOSED"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        (status, Json(ErrorResponse::new(code, self.to_string()))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, GatewayError>;

/// Submit order handler
pub async fn submit_order(
    State(gateway): State<Arc<Gateway>>,
    Path(book_id): Path<String>,
    Json(req): Json<SubmitOrderRequest>,
) -> ApiResult<SubmitOutcome> {
    let proposal = protocol::proposal(req.give, req.want);
    let outcome = gateway.submit_order(Some(book_id.as_str()), proposal, req.order_id).await?;
    Ok(Json(outcome))
}

/// Book orders handler
pub async fn get_book_orders(
    State(gateway): State<Arc<Gateway>>,
    Path(book_id): Path<String>,
) -> ApiResult<BookOrdersView> {
    Ok(Json(gateway.get_book_orders(Some(book_id.as_str()))?))
}

/// Order status handler
pub async fn get_order_status(
    State(gateway): State<Arc<Gateway>>,
    Path(book_id): Path<String>,
    Json(req): Json<OrderStatusRequest>,
) -> ApiResult<BookOrdersView> {
    Ok(Json(gateway.get_order_status(Some(book_id.as_str()), &req.order_ids)?))
}

/// Single offer handler
pub async fn get_offer(
    State(gateway): State<Arc<Gateway>>,
    Path((book_id, order_id)): Path<(String, OrderId)>,
) -> ApiResult<OrderView> {
    Ok(Json(gateway.get_offer(Some(book_id.as_str()), &order_id)?))
}
