//! Directory listings: departments and users.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::{Department, DbPool, DirectoryRow, User, UserBasic};
use crate::AppState;

use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub search: Option<String>,
}

/// Look up a single department by id, for profile responses.
pub async fn fetch_department(
    pool: &DbPool,
    department_id: Option<&str>,
) -> Result<Option<Department>, ApiError> {
    let Some(id) = department_id else {
        return Ok(None);
    };

    let department = sqlx::query_as::<_, Department>("SELECT id, name FROM departments WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(department)
}

pub async fn fetch_departments(pool: &DbPool) -> Result<Vec<Department>, ApiError> {
    let departments = sqlx::query_as::<_, Department>(
        "SELECT id, name FROM departments ORDER BY name COLLATE NOCASE, id",
    )
    .fetch_all(pool)
    .await?;

    Ok(departments)
}

/// Escape LIKE wildcards in a user-supplied search term.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// List all users except `exclude_user_id`, optionally filtered by a
/// case-insensitive substring match against username, first name, and
/// last name. Ordered by username so the listing is stable.
pub async fn fetch_users(
    pool: &DbPool,
    exclude_user_id: &str,
    search: Option<&str>,
) -> Result<Vec<UserBasic>, ApiError> {
    let base = r#"
        SELECT u.id, u.username, u.first_name, u.last_name, u.role,
               d.id AS department_id, d.name AS department_name
        FROM users u
        LEFT JOIN departments d ON u.department_id = d.id
        WHERE u.id != ?
    "#;

    let search = search.map(str::trim).filter(|s| !s.is_empty());
    let rows: Vec<DirectoryRow> = match search {
        Some(term) => {
            let pattern = format!("%{}%", escape_like(term));
            let sql = format!(
                r#"{base}
                  AND (u.username LIKE ? ESCAPE '\'
                    OR u.first_name LIKE ? ESCAPE '\'
                    OR u.last_name LIKE ? ESCAPE '\')
                ORDER BY u.username"#
            );
            sqlx::query_as(&sql)
                .bind(exclude_user_id)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!("{base} ORDER BY u.username");
            sqlx::query_as(&sql)
                .bind(exclude_user_id)
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows.into_iter().map(UserBasic::from).collect())
}

/// List all departments
///
/// GET /api/departments
pub async fn list_departments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Department>>, ApiError> {
    let departments = fetch_departments(&state.db).await?;
    Ok(Json(departments))
}

/// List all users except the caller, with optional search
///
/// GET /api/users?search=
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    user: User,
    Query(query): Query<UsersQuery>,
) -> Result<Json<Vec<UserBasic>>, ApiError> {
    let users = fetch_users(&state.db, &user.id, query.search.as_deref()).await?;
    Ok(Json(users))
}
