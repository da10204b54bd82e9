pub mod auth;
pub mod directory;
pub mod error;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Registration, session lifecycle, and the caller's own profile.
    // /me and /change-password are protected by the User extractor.
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/change-password", post(auth::change_password));

    // Directory: departments are public, the user listing is protected.
    let directory_routes = Router::new()
        .route("/departments", get(directory::list_departments))
        .route("/users", get(directory::list_users));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api", directory_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
