//! CreditLens Backend Library
//!
//! Token-authenticated credit lookups with an audit trail on a message bus.
//! Exposes the router and its parts for the binary and integration tests.

pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod credits;
pub mod error;
pub mod middleware;
