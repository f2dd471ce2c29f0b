//! Credit Lookup Endpoints
//! Mission: Answer credit queries and leave exactly one audit record per protected call

use crate::audit::{
    event::{compose, QueryKey, QueryOutcome},
    publisher::AuditPublisher,
};
use crate::auth::middleware::Authenticated;
use crate::credits::{
    models::{normalize_key, Credit},
    repository::CreditRepository,
};
use crate::error::{ApiError, ErrorReply};
use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::Uri,
    Json,
};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct CreditsState {
    pub repository: Arc<dyn CreditRepository>,
    pub audit: AuditPublisher,
}

impl CreditsState {
    pub fn new(repository: Arc<dyn CreditRepository>, audit: AuditPublisher) -> Self {
        Self { repository, audit }
    }
}

/// Publish the outcome of one lookup, then hand the result back unchanged
fn audited<T>(
    state: &CreditsState,
    auth: &Authenticated,
    key: QueryKey,
    path: &str,
    result: Result<(T, usize), ApiError>,
) -> Result<T, ErrorReply> {
    let outcome = match &result {
        Ok((_, count)) => QueryOutcome::Success { count: *count },
        Err(e) => e.translate().1,
    };

    let event = compose(&auth.context, &key, &outcome);
    debug!(status = ?event.status, key = %key.value(), "composed audit event");
    state.audit.publish(event);

    result.map(|(value, _)| value).map_err(|e| e.at(path))
}

/// Split a path parameter into the value to audit and the usable key.
/// An undecodable segment is audited as sent.
fn lookup_key(
    param: Result<Path<String>, PathRejection>,
    path: &str,
    field: &str,
) -> (String, Result<String, ApiError>) {
    match param {
        Ok(Path(raw)) => {
            let key = normalize_key(&raw, field).map_err(ApiError::validation);
            (raw.trim().to_string(), key)
        }
        Err(rejection) => {
            let raw = path.rsplit('/').next().unwrap_or_default().to_string();
            (raw, Err(ApiError::from(rejection)))
        }
    }
}

/// Credits by invoice - GET /credits/:invoice_number
pub async fn credits_by_invoice(
    State(state): State<CreditsState>,
    auth: Authenticated,
    uri: Uri,
    param: Result<Path<String>, PathRejection>,
) -> Result<Json<Vec<Credit>>, ErrorReply> {
    let (raw, key) = lookup_key(param, uri.path(), "invoice number");
    let result = key.and_then(|key| {
        let credits = state.repository.find_by_invoice(&key)?;
        if credits.is_empty() {
            return Err(ApiError::not_found(format!("No credit found for invoice: {}", key)));
        }
        let count = credits.len();
        Ok((credits, count))
    });

    audited(&state, &auth, QueryKey::Invoice(raw), uri.path(), result).map(Json)
}

/// Credit by number - GET /credits/credit/:credit_number
pub async fn credit_by_number(
    State(state): State<CreditsState>,
    auth: Authenticated,
    uri: Uri,
    param: Result<Path<String>, PathRejection>,
) -> Result<Json<Credit>, ErrorReply> {
    let (raw, key) = lookup_key(param, uri.path(), "credit number");
    let result = key.and_then(|key| {
        state
            .repository
            .find_by_credit_number(&key)?
            .map(|credit| (credit, 1))
            .ok_or_else(|| {
                ApiError::not_found(format!("Credit not found with number: {}", key))
            })
    });

    audited(&state, &auth, QueryKey::CreditNumber(raw), uri.path(), result).map(Json)
}

/// Liveness text - GET /credits/status
pub async fn status() -> &'static str {
    "Credit lookup API is up!"
}
