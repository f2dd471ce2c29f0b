//! Authentication API Endpoints
//! Mission: Provide registration, login and user management endpoints

use crate::auth::{
    middleware::Authenticated,
    models::{LoginRequest, LoginResponse, Principal, RegisterRequest, UserResponse},
    token::TokenService,
    user_store::{CreateUser, UserStore},
};
use crate::error::{ApiError, ErrorReply};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{StatusCode, Uri},
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub user_store: Arc<UserStore>,
    pub tokens: Arc<TokenService>,
}

impl AuthState {
    pub fn new(user_store: Arc<UserStore>, tokens: Arc<TokenService>) -> Self {
        Self { user_store, tokens }
    }
}

/// Register user - POST /users
pub async fn register(
    State(state): State<AuthState>,
    uri: Uri,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ErrorReply> {
    let Json(payload) = payload.map_err(|e| ApiError::from(e).at(uri.path()))?;
    if let Some(problem) = payload.problem() {
        return Err(ApiError::validation(problem).at(uri.path()));
    }

    let created = state
        .user_store
        .create_user(payload.name.trim(), payload.login.trim(), &payload.password)
        .map_err(|e| ApiError::from(e).at(uri.path()))?;

    match created {
        CreateUser::Created(user) => Ok(Json(UserResponse::from_user(&user))),
        CreateUser::LoginTaken => Err(ApiError::conflict("login already in use").at(uri.path())),
    }
}

/// Login endpoint - POST /users/login
pub async fn login(
    State(state): State<AuthState>,
    uri: Uri,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ErrorReply> {
    let Json(payload) = payload.map_err(|e| ApiError::from(e).at(uri.path()))?;
    let login = payload.login.trim();
    info!("🔐 Login attempt: {}", login);

    let user = state
        .user_store
        .verify_password(login, &payload.password)
        .map_err(|e| ApiError::from(e).at(uri.path()))?;

    let Some(user) = user else {
        warn!("❌ Failed login attempt: {}", login);
        return Err(ApiError::InvalidCredentials.at(uri.path()));
    };

    let token = state
        .tokens
        .issue(&user.login)
        .map_err(|e| ApiError::from(e).at(uri.path()))?;

    info!("✅ Login successful: {}", user.login);

    Ok(Json(LoginResponse {
        name: user.name,
        login: user.login,
        token: token.encoded,
        expires_in: TokenService::lifetime().num_seconds(),
    }))
}

/// Current principal - GET /users/me
/// Built from the request context alone, no database lookup
pub async fn current_principal(auth: Authenticated) -> Json<Principal> {
    Json(auth.principal)
}

/// List all users - GET /users
pub async fn list_users(
    State(state): State<AuthState>,
    uri: Uri,
) -> Result<Json<Vec<UserResponse>>, ErrorReply> {
    let users = state
        .user_store
        .list_users()
        .map_err(|e| ApiError::from(e).at(uri.path()))?;

    Ok(Json(users.iter().map(UserResponse::from_user).collect()))
}

/// Get user - GET /users/:id
pub async fn get_user(
    State(state): State<AuthState>,
    _auth: Authenticated,
    uri: Uri,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<UserResponse>, ErrorReply> {
    let Path(id) = id.map_err(|e| ApiError::from(e).at(uri.path()))?;
    state
        .user_store
        .get_by_id(id)
        .map_err(|e| ApiError::from(e).at(uri.path()))?
        .map(|user| Json(UserResponse::from_user(&user)))
        .ok_or_else(|| ApiError::not_found(format!("User not found: {}", id)).at(uri.path()))
}

/// Delete user - DELETE /users/:id
pub async fn delete_user(
    State(state): State<AuthState>,
    auth: Authenticated,
    uri: Uri,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ErrorReply> {
    let Path(id) = id.map_err(|e| ApiError::from(e).at(uri.path()))?;
    let deleted = state
        .user_store
        .delete_user(id)
        .map_err(|e| ApiError::from(e).at(uri.path()))?;

    if !deleted {
        return Err(ApiError::not_found(format!("User not found: {}", id)).at(uri.path()));
    }

    info!("🗑️  User {} deleted by {}", id, auth.principal.login);

    Ok(StatusCode::NO_CONTENT)
}
