//! User models and the request/response types of the auth and directory APIs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Department;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub department_id: Option<String>,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Full profile returned to the owning user. Never carries the credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub department: Option<Department>,
    pub role: String,
}

impl UserResponse {
    pub fn new(user: User, department: Option<Department>) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            department,
            role: user.role,
        }
    }
}

/// Directory projection of a user, as returned by the user listing.
/// Excludes the credential and contact details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBasic {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub department: Option<Department>,
    pub role: String,
}

/// Row shape of the directory listing query (users LEFT JOIN departments).
#[derive(Debug, FromRow)]
pub struct DirectoryRow {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub department_id: Option<String>,
    pub department_name: Option<String>,
}

impl From<DirectoryRow> for UserBasic {
    fn from(row: DirectoryRow) -> Self {
        let department = match (row.department_id, row.department_name) {
            (Some(id), Some(name)) => Some(Department { id, name }),
            _ => None,
        };
        Self {
            id: row.id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            department,
            role: row.role,
        }
    }
}

// The request/response types below are shared with the CLI client, so
// they derive both directions of serde.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
