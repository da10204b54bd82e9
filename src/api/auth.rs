//! Authentication: registration, login/logout, profile, password change.
//!
//! Passwords are stored as salted Argon2 hashes. Logging in creates a row
//! in the session store and hands the client an opaque token, carried back
//! either in the session cookie or an `Authorization: Bearer` header. Every
//! protected handler receives the resolved [`User`] as an explicit
//! parameter via the extractor at the bottom of this file.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::db::{
    now_timestamp, ChangePasswordRequest, DbPool, LoginRequest, LoginResponse, MessageResponse,
    RegisterRequest, User, UserResponse,
};
use crate::session::SESSION_COOKIE;
use crate::AppState;

use super::directory::fetch_department;
use super::error::ApiError;
use super::validation;

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

// ============================================================================
// Service operations
// ============================================================================

/// Create a user from a registration request. Username uniqueness is
/// settled by the UNIQUE constraint, so two concurrent registrations of
/// the same name resolve to exactly one winner.
pub async fn register_user(pool: &DbPool, req: &RegisterRequest) -> Result<User, ApiError> {
    let id = Uuid::new_v4().to_string();
    let now = now_timestamp();
    let password_hash = hash_password(&req.password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::internal("Failed to hash password")
    })?;

    sqlx::query(
        r#"
        INSERT INTO users (id, username, password_hash, email, first_name, last_name, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 'user', ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&req.username)
    .bind(&password_hash)
    .bind(&req.email)
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            ApiError::username_taken()
        } else {
            e.into()
        }
    })?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;

    Ok(user)
}

/// Check credentials. Unknown username and wrong password return the
/// identical error, so callers cannot enumerate accounts.
pub async fn authenticate(pool: &DbPool, username: &str, password: &str) -> Result<User, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    let Some(user) = user else {
        return Err(ApiError::invalid_credentials());
    };

    if !verify_password(password, &user.password_hash) {
        return Err(ApiError::invalid_credentials());
    }

    Ok(user)
}

/// Apply a password change for an already-resolved user. Policy checks
/// run first; the current-password check never reveals which policy rule
/// would also have failed.
pub async fn apply_password_change(
    pool: &DbPool,
    user: &User,
    req: &ChangePasswordRequest,
) -> Result<(), ApiError> {
    validation::validate_password_change(
        &req.current_password,
        &req.new_password,
        &req.confirm_password,
    )
    .map_err(ApiError::policy_violation)?;

    if !verify_password(&req.current_password, &user.password_hash) {
        return Err(ApiError::wrong_password("Current password is incorrect"));
    }

    let password_hash = hash_password(&req.new_password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::internal("Failed to hash password")
    })?;

    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(now_timestamp())
        .bind(&user.id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the configured bootstrap admin account if it does not exist.
/// Called once at startup; a no-op when unconfigured or already present.
pub async fn ensure_admin_user(pool: &DbPool, auth: &AuthConfig) -> anyhow::Result<()> {
    let (Some(username), Some(password)) = (&auth.admin_username, &auth.admin_password) else {
        return Ok(());
    };

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("Failed to hash admin password: {e}"))?;
    let email = auth
        .admin_email
        .clone()
        .unwrap_or_else(|| format!("{username}@localhost"));
    let now = now_timestamp();

    sqlx::query(
        r#"
        INSERT INTO users (id, username, password_hash, email, first_name, last_name, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, 'System', 'Administrator', 'admin', ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(username)
    .bind(&password_hash)
    .bind(&email)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    info!(username = %username, "Created bootstrap admin user");
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Register a new user
///
/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    validation::validate_username(&req.username).map_err(ApiError::validation)?;
    validation::validate_email(&req.email).map_err(ApiError::validation)?;
    validation::validate_password(&req.password).map_err(ApiError::policy_violation)?;

    let user = register_user(&state.db, &req).await?;
    info!(username = %user.username, "Registered new user");

    Ok((StatusCode::CREATED, Json(UserResponse::new(user, None))))
}

/// Log in and establish a session
///
/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let user = authenticate(&state.db, &req.username, &req.password).await?;
    let token = state.sessions.create(&user.id).await?;

    info!(username = %user.username, "User logged in");

    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    let department = fetch_department(&state.db, user.department_id.as_deref()).await?;

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            message: "Login successful".to_string(),
            token,
            user: UserResponse::new(user, department),
        }),
    ))
}

/// Destroy the current session, if any. Idempotent: logging out without a
/// session (or twice) succeeds.
///
/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    if let Some(token) = extract_token(&headers) {
        state.sessions.destroy(&token).await?;
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/").build());

    Ok((
        jar,
        Json(MessageResponse {
            message: "Logout successful".to_string(),
        }),
    ))
}

/// Return the authenticated user's own profile
///
/// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<UserResponse>, ApiError> {
    let department = fetch_department(&state.db, user.department_id.as_deref()).await?;
    Ok(Json(UserResponse::new(user, department)))
}

/// Change the authenticated user's password
///
/// POST /api/auth/change-password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    apply_password_change(&state.db, &user, &req).await?;

    info!(username = %user.username, "Password changed");

    Ok(Json(MessageResponse {
        message: "Password changed successfully".to_string(),
    }))
}

// ============================================================================
// Session-bound request gate
// ============================================================================

/// Pull the session token out of the request: cookie first, then a
/// `Bearer` header for non-browser clients.
pub(crate) fn extract_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|s| s.to_string())
}

/// Extractor resolving the ambient session token into the authenticated
/// user. Handlers that take a [`User`] parameter are thereby protected:
/// a missing or invalid session short-circuits with 401 before the
/// handler body runs.
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthenticated("Not authenticated"))?;
        state.sessions.resolve(&token).await.map_err(ApiError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorCode;
    use crate::db::test_pool;
    use crate::session::SessionStore;

    fn register_req(username: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
            email: format!("{username}@example.com"),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
        }
    }

    fn change_req(current: &str, new: &str, confirm: &str) -> ChangePasswordRequest {
        ChangePasswordRequest {
            current_password: current.to_string(),
            new_password: new.to_string(),
            confirm_password: confirm.to_string(),
        }
    }

    #[tokio::test]
    async fn register_twice_fails_with_username_taken() {
        let pool = test_pool().await;

        let user = register_user(&pool, &register_req("bob", "secret1"))
            .await
            .unwrap();
        assert_eq!(user.username, "bob");
        assert_eq!(user.role, "user");
        assert_ne!(user.password_hash, "secret1");

        // Other field values do not matter; the username decides.
        let mut second = register_req("bob", "different9");
        second.email = "bob2@example.com".to_string();
        let err = register_user(&pool, &second).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UsernameTaken);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = 'bob'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn authenticate_failures_are_indistinguishable() {
        let pool = test_pool().await;
        register_user(&pool, &register_req("alice", "secret1"))
            .await
            .unwrap();

        let unknown = authenticate(&pool, "nobody", "secret1").await.unwrap_err();
        let wrong = authenticate(&pool, "alice", "wrongpass").await.unwrap_err();
        assert_eq!(unknown.code(), ErrorCode::InvalidCredentials);
        assert_eq!(wrong.code(), ErrorCode::InvalidCredentials);
        assert_eq!(unknown.message(), wrong.message());

        let user = authenticate(&pool, "alice", "secret1").await.unwrap();
        assert_eq!(user.username, "alice");
    }

    #[tokio::test]
    async fn change_password_enforces_policy_then_credentials() {
        let pool = test_pool().await;
        let user = register_user(&pool, &register_req("alice", "secret1"))
            .await
            .unwrap();

        // Too short
        let err = apply_password_change(&pool, &user, &change_req("secret1", "abc", "abc"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PolicyViolation);

        // Confirmation mismatch
        let err = apply_password_change(&pool, &user, &change_req("secret1", "secret2", "secret3"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PolicyViolation);

        // Unchanged password
        let err = apply_password_change(&pool, &user, &change_req("secret1", "secret1", "secret1"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PolicyViolation);

        // Wrong current password
        let err = apply_password_change(&pool, &user, &change_req("nope", "secret2", "secret2"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidCredentials);

        // Policy failures must leave the credential untouched
        assert!(authenticate(&pool, "alice", "secret1").await.is_ok());

        apply_password_change(&pool, &user, &change_req("secret1", "secret2", "secret2"))
            .await
            .unwrap();

        assert!(authenticate(&pool, "alice", "secret2").await.is_ok());
        let err = authenticate(&pool, "alice", "secret1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidCredentials);
    }

    #[tokio::test]
    async fn ensure_admin_user_is_conditional_and_idempotent() {
        let pool = test_pool().await;

        // Unconfigured: nothing happens.
        let auth = AuthConfig::default();
        ensure_admin_user(&pool, &auth).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);

        let auth = AuthConfig {
            admin_username: Some("admin".to_string()),
            admin_password: Some("changeme1".to_string()),
            ..AuthConfig::default()
        };
        ensure_admin_user(&pool, &auth).await.unwrap();
        ensure_admin_user(&pool, &auth).await.unwrap();

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = 'admin'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);

        let admin = authenticate(&pool, "admin", "changeme1").await.unwrap();
        assert_eq!(admin.role, "admin");
    }

    #[tokio::test]
    async fn login_session_directory_and_password_change_scenario() {
        let pool = test_pool().await;
        let sessions = SessionStore::new(pool.clone(), 24);

        register_user(&pool, &register_req("alice", "secret1"))
            .await
            .unwrap();
        register_user(&pool, &register_req("carol", "secret1"))
            .await
            .unwrap();

        // Login alice, resolve her session.
        let alice = authenticate(&pool, "alice", "secret1").await.unwrap();
        let token = sessions.create(&alice.id).await.unwrap();
        let resolved = sessions.resolve(&token).await.unwrap();
        assert_eq!(resolved.id, alice.id);

        // Directory as alice excludes alice.
        let users = crate::api::directory::fetch_users(&pool, &alice.id, None)
            .await
            .unwrap();
        assert!(users.iter().all(|u| u.username != "alice"));
        assert!(users.iter().any(|u| u.username == "carol"));

        // Change password, old credential stops working.
        apply_password_change(&pool, &alice, &change_req("secret1", "secret2", "secret2"))
            .await
            .unwrap();
        assert!(authenticate(&pool, "alice", "secret1").await.is_err());
        assert!(authenticate(&pool, "alice", "secret2").await.is_ok());

        // Logout destroys the session.
        sessions.destroy(&token).await.unwrap();
        assert!(sessions.resolve(&token).await.is_err());
    }

    #[test]
    fn extract_token_prefers_cookie_then_bearer() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(extract_token(&headers).as_deref(), Some("abc123"));

        headers.insert(
            header::COOKIE,
            format!("{SESSION_COOKIE}=cookie-token").parse().unwrap(),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("cookie-token"));

        // A non-bearer Authorization header is not a token.
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic abc123".parse().unwrap());
        assert_eq!(extract_token(&headers), None);
    }
}
