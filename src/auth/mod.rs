//! Authentication Module
//! Mission: Issue bearer tokens and resolve a caller identity for every request

pub mod api;
pub mod middleware;
pub mod models;
pub mod token;
pub mod user_store;

pub use api::AuthState;
pub use middleware::{authenticate, Authenticated, PublicPaths, RequestAuthenticator, RequestContext};
pub use models::Principal;
pub use token::{Token, TokenError, TokenService};
pub use user_store::{PrincipalDirectory, UserStore};
