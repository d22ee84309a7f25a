//! User repository for Gator.
//!
//! This module provides CRUD operations for users in the database.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::user::{NewUser, User};
use super::{format_timestamp, parse_timestamp, DbPool};
use crate::error::is_unique_violation;
use crate::{GatorError, Result};

/// Row type for a user from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = GatorError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: parse_uuid("users.id", &row.id)?,
            name: row.name,
            created_at: require_timestamp("users.created_at", &row.created_at)?,
            updated_at: require_timestamp("users.updated_at", &row.updated_at)?,
        })
    }
}

/// Parse a stored UUID column. A corrupt value is a database error.
pub(crate) fn parse_uuid(column: &str, s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| GatorError::Database(format!("corrupt {column} {s:?}: {e}")))
}

/// Parse a stored timestamp column. A corrupt value is a database error.
pub(crate) fn require_timestamp(column: &str, s: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(s).ok_or_else(|| GatorError::Database(format!("corrupt {column} {s:?}")))
}

/// Repository for user CRUD operations.
pub struct UserRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new user in the database.
    ///
    /// Returns `AlreadyExists` if the name is taken.
    pub async fn create(&self, new_user: &NewUser) -> Result<User> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name.clone(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query("INSERT INTO users (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(user.id.to_string())
            .bind(&user.name)
            .bind(format_timestamp(&user.created_at))
            .bind(format_timestamp(&user.updated_at))
            .execute(self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    GatorError::AlreadyExists(format!("user {}", new_user.name))
                } else {
                    GatorError::Database(e.to_string())
                }
            })?;

        Ok(user)
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        row.map(User::try_from).transpose()
    }

    /// Get a user by name.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        row.map(User::try_from).transpose()
    }

    /// List all users ordered by name.
    pub async fn list_all(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users ORDER BY name ASC",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        rows.into_iter().map(User::try_from).collect()
    }

    /// Delete every user. Feeds, follows and posts go with them.
    ///
    /// Returns the number of users deleted.
    pub async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM users")
            .execute(self.pool)
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    /// Count all users.
    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool)
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(count.0)
    }
}
