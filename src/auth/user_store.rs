//! User Storage
//! Mission: Store user accounts with SQLite and bcrypt-hashed passwords

use crate::auth::models::User;
use anyhow::{Context, Result};
use bcrypt::{hash, verify};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

/// Lookup of logins that may still act as a principal.
///
/// A valid token for a login that no longer exists resolves to anonymous.
pub trait PrincipalDirectory: Send + Sync {
    fn contains_login(&self, login: &str) -> Result<bool>;
}

/// Outcome of an insert attempt
#[derive(Debug)]
pub enum CreateUser {
    Created(User),
    LoginTaken,
}

/// User storage with SQLite backend
pub struct UserStore {
    db_path: String,
    bcrypt_cost: u32,
}

impl UserStore {
    /// Create a new user store and initialize database
    pub fn new(db_path: &str, bcrypt_cost: u32) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
            bcrypt_cost,
        };
        store.init_db()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open user database at {}", self.db_path))
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                login TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            login: row.get(2)?,
            password_hash: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    /// Get user by login
    pub fn get_by_login(&self, login: &str) -> Result<Option<User>> {
        let conn = self.open()?;
        let user = conn
            .query_row(
                "SELECT id, name, login, password_hash, created_at FROM users WHERE login = ?1",
                params![login],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Get user by id
    pub fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let conn = self.open()?;
        let user = conn
            .query_row(
                "SELECT id, name, login, password_hash, created_at FROM users WHERE id = ?1",
                params![id],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Verify login and password, returning the account on success
    pub fn verify_password(&self, login: &str, password: &str) -> Result<Option<User>> {
        match self.get_by_login(login)? {
            Some(user) => {
                let valid =
                    verify(password, &user.password_hash).context("Failed to verify password")?;
                Ok(valid.then_some(user))
            }
            None => Ok(None),
        }
    }

    /// Create a new user unless the login is already taken
    pub fn create_user(&self, name: &str, login: &str, password: &str) -> Result<CreateUser> {
        if self.get_by_login(login)?.is_some() {
            return Ok(CreateUser::LoginTaken);
        }

        let password_hash = hash(password, self.bcrypt_cost).context("Failed to hash password")?;
        let created_at = Utc::now().to_rfc3339();

        let conn = self.open()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO users (name, login, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, login, password_hash, created_at],
        )?;

        // Lost a race with a concurrent registration of the same login
        if inserted == 0 {
            return Ok(CreateUser::LoginTaken);
        }

        let user = User {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            login: login.to_string(),
            password_hash,
            created_at,
        };

        info!(login = %user.login, id = user.id, "✅ Created user");

        Ok(CreateUser::Created(user))
    }

    /// List all users
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.open()?;

        let mut stmt = conn
            .prepare("SELECT id, name, login, password_hash, created_at FROM users ORDER BY id")?;

        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    /// Delete a user by id. Returns false when no such user exists.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        let conn = self.open()?;

        let rows_affected = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;

        if rows_affected > 0 {
            info!(id, "🗑️  Deleted user");
        }
        Ok(rows_affected > 0)
    }
}

impl PrincipalDirectory for UserStore {
    fn contains_login(&self, login: &str) -> Result<bool> {
        Ok(self.get_by_login(login)?.is_some())
    }
}
