//! Authentication Middleware
//! Mission: Resolve the caller's identity for every request without ever rejecting it
//!
//! Resolution and enforcement are split: `authenticate` only attaches a
//! `RequestContext` to the request, and handlers that need an identity ask for
//! it through the `Authenticated` extractor, which answers 401 on its own.

use crate::audit::event::resolve_source_ip;
use crate::auth::{models::Principal, token::TokenService, user_store::PrincipalDirectory};
use crate::error::{ApiError, ErrorReply};
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Terminal state of the per-request authentication state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Path is on the public allow-list; no token was looked at
    Bypassed,
    PrincipalResolved,
    Anonymous,
}

/// Request-local authentication state. Lives in the request's extensions and
/// is dropped with the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Option<Principal>,
    pub resolution: Resolution,
    pub source_ip: String,
    pub path: String,
}

/// Allow-list of paths that skip token processing.
///
/// Entries ending in `*` match by prefix, everything else must match exactly.
#[derive(Debug, Clone, Default)]
pub struct PublicPaths {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl PublicPaths {
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut paths = Self::default();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            match pattern.strip_suffix('*') {
                Some(prefix) => paths.prefixes.push(prefix.to_string()),
                None => paths.exact.push(pattern.to_string()),
            }
        }
        paths
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.exact.iter().any(|p| p == path) || self.prefixes.iter().any(|p| path.starts_with(p))
    }
}

/// Extract the token from a well-formed `Bearer <token>` header value
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token)
}

/// Per-request gate. Holds only immutable state, shared across all requests.
pub struct RequestAuthenticator {
    tokens: Arc<TokenService>,
    public_paths: PublicPaths,
    directory: Option<Arc<dyn PrincipalDirectory>>,
}

impl RequestAuthenticator {
    pub fn new(tokens: Arc<TokenService>, public_paths: PublicPaths) -> Self {
        Self {
            tokens,
            public_paths,
            directory: None,
        }
    }

    /// Also require the token subject to still exist in `directory`
    pub fn with_directory(mut self, directory: Arc<dyn PrincipalDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Run the state machine for one request. Never fails.
    pub fn resolve(&self, path: &str, headers: &HeaderMap, peer: Option<SocketAddr>) -> RequestContext {
        let source_ip = resolve_source_ip(headers, peer);
        let anonymous = |resolution| RequestContext {
            principal: None,
            resolution,
            source_ip: source_ip.clone(),
            path: path.to_string(),
        };

        if self.public_paths.is_public(path) {
            return anonymous(Resolution::Bypassed);
        }

        let Some(token) = bearer_token(headers) else {
            debug!(path, "no bearer token, continuing as anonymous");
            return anonymous(Resolution::Anonymous);
        };

        let login = match self.tokens.subject_of(token) {
            Ok(login) => login,
            Err(e) => {
                debug!(path, reason = %e, "token rejected, continuing as anonymous");
                return anonymous(Resolution::Anonymous);
            }
        };

        if let Some(directory) = &self.directory {
            match directory.contains_login(&login) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(path, login = %login, "token subject no longer exists");
                    return anonymous(Resolution::Anonymous);
                }
                Err(e) => {
                    warn!(path, login = %login, error = %e, "principal lookup failed");
                    return anonymous(Resolution::Anonymous);
                }
            }
        }

        RequestContext {
            principal: Some(Principal::new(login)),
            resolution: Resolution::PrincipalResolved,
            source_ip,
            path: path.to_string(),
        }
    }
}

/// Middleware that attaches a `RequestContext` to every request
pub async fn authenticate(
    State(authenticator): State<Arc<RequestAuthenticator>>,
    mut req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let context = authenticator.resolve(req.uri().path(), req.headers(), peer);
    req.extensions_mut().insert(context);

    next.run(req).await
}

/// Policy check for endpoints that need an identity
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub principal: Principal,
    pub context: RequestContext,
}

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ErrorReply;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts.extensions.get::<RequestContext>().cloned();

        match context {
            Some(context) => match context.principal.clone() {
                Some(principal) => Ok(Self { principal, context }),
                None => Err(ApiError::Unauthorized.at(parts.uri.path())),
            },
            None => Err(ApiError::Unauthorized.at(parts.uri.path())),
        }
    }
}
