//! Credits Module
//! Mission: Serve tax-credit lookups by invoice number or credit number

pub mod api;
pub mod models;
pub mod repository;

pub use api::CreditsState;
pub use models::Credit;
pub use repository::{CreditRepository, InMemoryCreditRepository, SqliteCreditRepository};
