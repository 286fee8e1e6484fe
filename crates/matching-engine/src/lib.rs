//! Matching engine for Simplex
//!
//! Each configured book is an [`OrderBookEngine`]: it records orders,
//! keeps the resting buy and sell lists in arrival order, pairs an
//! incoming order with the oldest resting order of identical size, and
//! hands the pair to the escrow to settle. Every change publishes a new
//! version through a [`ChangeNotifier`] so subscribers can follow the book
//! without polling.
//!
//! # Modules
//!
//! - [`engine`] - Submission, matching and queries for one book
//! - [`book`] - Resting lists and history
//! - [`store`] - Order record store
//! - [`notifier`] - Versioned change notification
//! - [`projection`] - Public views with stable public ids
//! - [`reconcile`] - Background cancellation of withdrawn orders
//! - [`registry`] - All books in the process

pub mod book;
pub mod domain;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod notifier;
pub mod projection;
pub mod reconcile;
pub mod registry;
pub mod store;

pub use domain::{BookSnapshot, Order, OrderStateChange, SubmitOutcome};
pub use engine::{BookTerms, OrderBookEngine};
pub use error::{MatchingError, Result};
pub use notifier::{ChangeNotifier, Versioned};
pub use projection::{BookOrdersView, BrandKeywords, ConfiguredKeywords, OrderView, PublicProjector};
pub use reconcile::ReconciliationWorker;
pub use registry::BookRegistry;
pub use store::{InMemoryOrderStore, OrderStore, StoreError};
