//! Common types and utilities for Simplex
//!
//! This crate provides shared types used across all Simplex crates:
//! order identities, directions, lifecycle states, branded amounts
//! and the give/want proposal shape submitted by participants.
//!
//! # Modules
//!
//! - [`error`] - Common error types
//! - [`types`] - Shared domain types (OrderId, Direction, Amount, Proposal, etc.)

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
