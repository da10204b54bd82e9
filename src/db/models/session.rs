use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stored session row. Only the SHA-256 hash of the opaque token is
/// persisted; the token itself exists only on the client side.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}
