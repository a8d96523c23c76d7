//! User repository for database operations.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use crate::ws::{BOT_IDENTITY, SYSTEM_IDENTITY};

const MAX_USERNAME_LEN: usize = 64;

/// A known identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct User {
    pub username: String,
    pub email: Option<String>,
    pub created_at: String,
}

/// Check that `username` can be used as a routing identity.
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        bail!("Username must not be empty.");
    }
    if username.len() > MAX_USERNAME_LEN {
        bail!("Username must be at most {MAX_USERNAME_LEN} characters.");
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        bail!("Invalid username format: only letters, digits, '_', '-' and '.' are allowed.");
    }
    if username == BOT_IDENTITY || username == SYSTEM_IDENTITY {
        bail!("Username '{username}' is reserved.");
    }
    Ok(())
}

/// Repository for user database operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user.
    #[instrument(skip(self))]
    pub async fn create_user(&self, username: &str, email: Option<&str>) -> Result<User> {
        validate_username(username)?;

        if self.find_user_by_identity(username).await?.is_some() {
            bail!("Username '{username}' is already taken.");
        }

        debug!("Creating user: {}", username);

        sqlx::query("INSERT INTO users (username, email) VALUES (?, ?)")
            .bind(username)
            .bind(email)
            .execute(&self.pool)
            .await
            .context("Failed to insert user")?;

        self.find_user_by_identity(username)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found after creation"))
    }

    /// Look up a user by identity.
    #[instrument(skip(self))]
    pub async fn find_user_by_identity(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT username, email, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by identity")?;

        Ok(user)
    }

    /// List all users ordered by name.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT username, email, created_at FROM users ORDER BY username",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list users")?;

        Ok(users)
    }

    /// Delete a user. Returns false when the user did not exist.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, username: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE username = ?")
            .bind(username)
            .execute(&self.pool)
            .await
            .context("Failed to delete user")?;

        Ok(result.rows_affected() > 0)
    }
}
