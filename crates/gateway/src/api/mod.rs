//! HTTP API for the gateway

pub mod handlers;
pub mod models;
pub mod routes;

pub use routes::create_router;
