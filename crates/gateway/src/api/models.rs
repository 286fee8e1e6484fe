//! API models for gateway HTTP endpoints

use std::collections::BTreeMap;

use common::{BrandedAmount, Keyword, OrderId};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/books/:book_id/orders`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOrderRequest {
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub give: BTreeMap<Keyword, BrandedAmount>,
    #[serde(default)]
    pub want: BTreeMap<Keyword, BrandedAmount>,
}

/// Body of `POST /api/v1/books/:book_id/orders/status`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusRequest {
    pub order_ids: Vec<OrderId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}
