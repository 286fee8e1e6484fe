//! API routes for the gateway

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::api::handlers::*;
use crate::gateway::Gateway;

/// Create the gateway router
pub fn create_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route(
            "/api/v1/books/:book_id/orders",
            post(submit_order).get(get_book_orders),
        )
        .route("/api/v1/books/:book_id/orders/status", post(get_order_status))
        .route("/api/v1/books/:book_id/orders/:order_id", get(get_offer))
        .with_state(gateway)
}
