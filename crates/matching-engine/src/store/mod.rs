//! Order record store
//!
//! Every order ever submitted to a book, keyed by its id.

mod memory;
mod traits;

pub use memory::InMemoryOrderStore;
pub use traits::*;
