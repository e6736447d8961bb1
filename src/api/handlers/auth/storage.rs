//! User store access for credential checks.
//!
//! Queries always bind parameters; user input never reaches the SQL text.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::Instrument;

use super::types::{Identity, Role};

/// Stored credential record for a user.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
}

impl UserRecord {
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            email: self.email.clone(),
            role: self.role,
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by email, ignoring case. An exact match wins over a
    /// case-folded one.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    /// Insert a new user. Returns `Ok(None)` when the email is already taken,
    /// in any letter case.
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Option<UserRecord>>;
}

/// `PostgreSQL`-backed user store (`users` table).
#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let query = r"
            SELECT id::int8 AS id, email, role, password
            FROM users
            WHERE lower(email) = lower($1)
            ORDER BY (email = $1) DESC, id
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.map(|row| UserRecord {
            id: row.get("id"),
            email: row.get("email"),
            role: Role::from_stored(row.get::<Option<String>, _>("role").as_deref()),
            password_hash: row.get("password"),
        }))
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Option<UserRecord>> {
        let query = r"
            INSERT INTO users (email, password, role)
            SELECT $1, $2, $3
            WHERE NOT EXISTS (SELECT 1 FROM users WHERE lower(email) = lower($1))
            ON CONFLICT (email) DO NOTHING
            RETURNING id::int8 AS id, email, role
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT"
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(password_hash)
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.map(|row| UserRecord {
            id: row.get("id"),
            email: row.get("email"),
            role: Role::from_stored(row.get::<Option<String>, _>("role").as_deref()),
            password_hash: password_hash.to_string(),
        }))
    }
}

/// In-memory user store, used by tests and local tooling.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let users = self
            .users
            .lock()
            .map_err(|_| anyhow::anyhow!("user store lock poisoned"))?;
        if let Some(record) = users.get(email) {
            return Ok(Some(record.clone()));
        }
        let folded = email.to_lowercase();
        Ok(users
            .values()
            .filter(|record| record.email.to_lowercase() == folded)
            .min_by_key(|record| record.id)
            .cloned())
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Option<UserRecord>> {
        let mut users = self
            .users
            .lock()
            .map_err(|_| anyhow::anyhow!("user store lock poisoned"))?;
        let folded = email.to_lowercase();
        if users
            .values()
            .any(|record| record.email.to_lowercase() == folded)
        {
            return Ok(None);
        }
        let id = i64::try_from(users.len())? + 1;
        let record = UserRecord {
            id,
            email: email.to_string(),
            role,
            password_hash: password_hash.to_string(),
        };
        users.insert(email.to_string(), record.clone());
        Ok(Some(record))
    }
}
