//! Session lifecycle: opaque unguessable tokens mapped to user identities.
//!
//! Sessions live in the `sessions` table, keyed by the SHA-256 hash of the
//! token handed to the client. The store is injected through `AppState`, so
//! handlers and tests never touch process-global session state.

use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::db::{now_timestamp, Session, User};

/// Name of the cookie the server sets on login.
pub const SESSION_COOKIE: &str = "roster_session";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Token absent, unknown, expired, destroyed, or pointing at a user
    /// that no longer exists. Deliberately a single variant.
    #[error("not authenticated")]
    Unauthenticated,
    #[error("session store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Maps opaque session tokens to authenticated users, with a fixed
/// (non-sliding) expiry.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
    ttl_hours: i64,
}

impl SessionStore {
    pub fn new(pool: SqlitePool, ttl_hours: i64) -> Self {
        Self { pool, ttl_hours }
    }

    /// Generate a random session token
    fn generate_token() -> String {
        let mut rng = rand::rng();
        let bytes: [u8; 32] = rng.random();
        hex::encode(bytes)
    }

    /// Hash a token for storage
    fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Create a session for `user_id` and return the opaque token.
    pub async fn create(&self, user_id: &str) -> Result<String, SessionError> {
        let token = Self::generate_token();
        let token_hash = Self::hash_token(&token);

        let expires_at = (Utc::now() + Duration::hours(self.ttl_hours))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();

        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(&token_hash)
        .bind(&expires_at)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;

        debug!(user_id, "Session created");
        Ok(token)
    }

    /// Resolve a token to its user. Every failure mode is the same
    /// `Unauthenticated` error, including a session whose user row is gone.
    pub async fn resolve(&self, token: &str) -> Result<User, SessionError> {
        let token_hash = Self::hash_token(token);

        let session: Option<Session> = sqlx::query_as(
            "SELECT * FROM sessions WHERE token_hash = ? AND expires_at > ?",
        )
        .bind(&token_hash)
        .bind(now_timestamp())
        .fetch_optional(&self.pool)
        .await?;

        let session = session.ok_or(SessionError::Unauthenticated)?;

        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&session.user_id)
            .fetch_optional(&self.pool)
            .await?;

        user.ok_or(SessionError::Unauthenticated)
    }

    /// Destroy the session behind `token`. Idempotent; destroying an
    /// unknown or already-destroyed token is not an error.
    pub async fn destroy(&self, token: &str) -> Result<(), SessionError> {
        let token_hash = Self::hash_token(token);
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(&token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete expired session rows. Called at startup; resolution rejects
    /// expired tokens regardless.
    pub async fn purge_expired(&self) -> Result<u64, SessionError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now_timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn insert_user(pool: &SqlitePool, username: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, email, first_name, last_name, role, created_at, updated_at)
             VALUES (?, ?, 'x', ?, 'Test', 'User', 'user', ?, ?)",
        )
        .bind(&id)
        .bind(username)
        .bind(format!("{username}@example.com"))
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn token_is_opaque_hex_and_not_stored_verbatim() {
        let pool = test_pool().await;
        let user_id = insert_user(&pool, "alice").await;
        let store = SessionStore::new(pool.clone(), 24);

        let token = store.create(&user_id).await.unwrap();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

        let stored: Option<(String,)> =
            sqlx::query_as("SELECT id FROM sessions WHERE token_hash = ?")
                .bind(&token)
                .fetch_optional(&pool)
                .await
                .unwrap();
        assert!(stored.is_none(), "raw token must never reach the database");
    }

    #[tokio::test]
    async fn resolve_roundtrip_and_destroy() {
        let pool = test_pool().await;
        let user_id = insert_user(&pool, "alice").await;
        let store = SessionStore::new(pool, 24);

        let token = store.create(&user_id).await.unwrap();
        let user = store.resolve(&token).await.unwrap();
        assert_eq!(user.id, user_id);
        assert_eq!(user.username, "alice");

        store.destroy(&token).await.unwrap();
        assert!(matches!(
            store.resolve(&token).await,
            Err(SessionError::Unauthenticated)
        ));

        // Destroying again is not an error.
        store.destroy(&token).await.unwrap();
        store.destroy("no-such-token").await.unwrap();
    }

    #[tokio::test]
    async fn unknown_token_is_unauthenticated() {
        let pool = test_pool().await;
        let store = SessionStore::new(pool, 24);
        assert!(matches!(
            store.resolve("deadbeef").await,
            Err(SessionError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn expired_session_is_rejected_and_purged() {
        let pool = test_pool().await;
        let user_id = insert_user(&pool, "alice").await;
        let store = SessionStore::new(pool.clone(), 24);

        let live = store.create(&user_id).await.unwrap();
        let expired = store.create(&user_id).await.unwrap();
        sqlx::query("UPDATE sessions SET expires_at = '2000-01-01 00:00:00' WHERE token_hash = ?")
            .bind(SessionStore::hash_token(&expired))
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(
            store.resolve(&expired).await,
            Err(SessionError::Unauthenticated)
        ));

        let purged = store.purge_expired().await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.resolve(&live).await.is_ok());
    }

    #[tokio::test]
    async fn orphaned_session_is_unauthenticated() {
        let pool = test_pool().await;
        let user_id = insert_user(&pool, "alice").await;
        let store = SessionStore::new(pool.clone(), 24);

        let token = store.create(&user_id).await.unwrap();

        // Simulate an out-of-band user deletion that leaves the session row.
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(&user_id)
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(
            store.resolve(&token).await,
            Err(SessionError::Unauthenticated)
        ));
    }
}
