//! Client-facing gateway for Simplex
//!
//! Bridges transports to the books: HTTP requests via [`api::create_router`]
//! and WebSocket frames via [`WsHandler`]. The [`Gateway`] keeps per
//! connection sessions, coerces requests onto the pinned default book, and
//! fans every new book version out to subscribed connections.

pub mod api;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod ws;

pub use api::create_router;
pub use error::{GatewayError, Result};
pub use gateway::Gateway;
pub use protocol::{ClientRequest, ServerMessage, SubscribeStatus};
pub use ws::WsHandler;
