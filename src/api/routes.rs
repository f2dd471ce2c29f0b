//! HTTP surface: routes, layers and application state

use crate::audit::{AuditPublisher, InMemoryBus, MessageBus, PublishStatsSnapshot, RestProxyBus};
use crate::auth::{
    api as auth_api, authenticate, AuthState, PrincipalDirectory, PublicPaths,
    RequestAuthenticator, TokenService, UserStore,
};
use crate::config::Config;
use crate::credits::{api as credits_api, CreditRepository, CreditsState, SqliteCreditRepository};
use crate::middleware::request_logging;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    middleware::{from_fn, from_fn_with_state},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub credits: CreditsState,
    pub authenticator: Arc<RequestAuthenticator>,
    pub audit: AuditPublisher,
}

/// Wire stores, token service and audit publisher from configuration
pub fn build_state(config: &Config) -> Result<AppState> {
    let tokens = Arc::new(TokenService::new(&config.jwt_secret));

    let user_store = Arc::new(
        UserStore::new(&config.auth_db_path, config.bcrypt_cost)
            .context("Failed to initialize user store")?,
    );

    let repository = SqliteCreditRepository::new(&config.credits_db_path)
        .context("Failed to initialize credit repository")?;
    if config.seed_demo_data {
        repository.seed_demo()?;
    }

    let bus: Arc<dyn MessageBus> = match &config.audit_bus_url {
        Some(url) => {
            info!(url = %url, topic = %config.audit_topic, "📨 Audit events go to REST proxy");
            Arc::new(RestProxyBus::new(url, config.audit_bus_timeout())?)
        }
        None => {
            info!(topic = %config.audit_topic, "📨 Audit events kept in-process");
            Arc::new(InMemoryBus::new())
        }
    };

    Ok(assemble(
        tokens,
        user_store,
        Arc::new(repository),
        AuditPublisher::new(bus, &config.audit_topic),
        config.public_paths(),
    ))
}

/// Assemble state from already-built parts
pub fn assemble(
    tokens: Arc<TokenService>,
    user_store: Arc<UserStore>,
    repository: Arc<dyn CreditRepository>,
    audit: AuditPublisher,
    public_paths: PublicPaths,
) -> AppState {
    let directory: Arc<dyn PrincipalDirectory> = user_store.clone();
    let authenticator = Arc::new(
        RequestAuthenticator::new(tokens.clone(), public_paths).with_directory(directory),
    );

    AppState {
        auth: AuthState::new(user_store, tokens),
        credits: CreditsState::new(repository, audit.clone()),
        authenticator,
        audit,
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let credit_routes = Router::new()
        .route("/credits/status", get(credits_api::status))
        .route("/credits/:invoice_number", get(credits_api::credits_by_invoice))
        .route("/credits/credit/:credit_number", get(credits_api::credit_by_number))
        .with_state(state.credits);

    let user_routes = Router::new()
        .route("/users", post(auth_api::register).get(auth_api::list_users))
        .route("/users/login", post(auth_api::login))
        .route("/users/me", get(auth_api::current_principal))
        .route(
            "/users/:id",
            get(auth_api::get_user).delete(auth_api::delete_user),
        )
        .with_state(state.auth);

    let health_routes = Router::new()
        .route("/health", get(health_check))
        .with_state(state.audit);

    Router::new()
        .merge(credit_routes)
        .merge(user_routes)
        .merge(health_routes)
        .layer(from_fn_with_state(state.authenticator, authenticate))
        .layer(from_fn(request_logging))
        .layer(CorsLayer::permissive())
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check(State(audit): State<AuditPublisher>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        audit: AuditHealth {
            topic: audit.topic().to_string(),
            stats: audit.stats(),
        },
    })
}

// ===== Response Types =====

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub audit: AuditHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditHealth {
    pub topic: String,
    #[serde(flatten)]
    pub stats: PublishStatsSnapshot,
}
