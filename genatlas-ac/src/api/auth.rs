//! Request identity
//!
//! The identity collaborator authenticates upstream and forwards the caller
//! as an `X-User-Id` header; this service trusts the header and resolves it
//! against the users table. A missing or unknown id is `Forbidden`, so role
//! enforcement never sees an anonymous caller.

use crate::error::ApiError;
use crate::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use genatlas_common::db::{Role, User};
use genatlas_common::Error;
use sqlx::{Row, SqlitePool};

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller, resolved from `X-User-Id`
pub struct CurrentUser(pub User);

pub async fn load_user(db: &SqlitePool, id: &str) -> genatlas_common::Result<User> {
    let row = sqlx::query("SELECT id, username, email, role FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;

    match row {
        Some(row) => {
            let role_str: String = row.get("role");
            Ok(User {
                id: row.get("id"),
                username: row.get("username"),
                email: row.get("email"),
                role: Role::parse(&role_str)?,
            })
        }
        None => Err(Error::Forbidden(format!("unknown user id: {}", id))),
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ApiError::Core(Error::Forbidden("missing X-User-Id header".to_string()))
            })?;

        let user = load_user(&state.db, id).await?;
        Ok(CurrentUser(user))
    }
}
