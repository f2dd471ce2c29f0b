//! Authentication Models
//! Mission: Define user, principal and token data structures

use serde::{Deserialize, Serialize};

/// Stored user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub login: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub created_at: String,
}

/// Resolved identity of the caller for the duration of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub login: String,
}

impl Principal {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
        }
    }
}

/// Token claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // subject (login)
    pub iat: i64,    // issued at, epoch seconds
    pub exp: i64,    // expiration, epoch seconds
}

/// Registration request body
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub login: String,
    pub password: String,
}

impl RegisterRequest {
    /// First problem found with the request, if any
    pub fn problem(&self) -> Option<&'static str> {
        if self.name.trim().is_empty() {
            return Some("name is required");
        }
        if self.login.trim().is_empty() {
            return Some("login is required");
        }
        if self.password.chars().count() < 6 {
            return Some("password must be at least 6 characters");
        }
        None
    }
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub name: String,
    pub login: String,
    pub token: String,
    pub expires_in: i64, // seconds until expiration
}

/// User response (sanitized)
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub login: String,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            login: user.login.clone(),
        }
    }
}
