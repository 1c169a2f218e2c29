//! Request identity.
//!
//! Authentication happens upstream at the auth provider; the proxy in front
//! of the gateway forwards the verified user id and display name as headers.
//! The role is looked up in the users collection on every request.
//!
//! ```ignore
//! async fn my_handler(AdminSession(session): AdminSession, ...) -> ... {
//!     // session.user_id is available here
//! }
//! ```

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::models::{AccountStatus, Role};
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";

const DEFAULT_DISPLAY_NAME: &str = "Admin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id =
            header(parts, USER_ID_HEADER).ok_or(AppError::Unauthorized("Missing user identity"))?;

        // role lookup fails closed
        let profile = state.users.get(&user_id).await?;
        if let Some(profile) = &profile {
            if profile.status == AccountStatus::Suspended {
                return Err(AppError::Unauthorized("Account suspended"));
            }
        }

        let display_name = header(parts, USER_NAME_HEADER)
            .or_else(|| profile.as_ref().and_then(|p| p.display_name.clone()))
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

        Ok(Session {
            user_id,
            display_name,
            role: profile.map(|p| p.role).unwrap_or_default(),
        })
    }
}

/// A session whose user has the admin role.
pub struct AdminSession(pub Session);

impl FromRequestParts<Arc<AppState>> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        if !session.is_admin() {
            tracing::warn!(user = %session.user_id, "admin route denied");
            return Err(AppError::Forbidden);
        }
        Ok(AdminSession(session))
    }
}
