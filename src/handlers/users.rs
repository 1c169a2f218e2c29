use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use serde_json::{Value, json};

use super::{ListParams, required};
use crate::error::AppError;
use crate::models::{RegisterProfileDto, UserProfile};
use crate::session::{AdminSession, Session};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list))
        .route("/me", post(register))
        .route("/{id}/status", post(toggle_status))
        .route("/{id}/role", post(toggle_role))
        .route("/{id}", delete(remove))
}

async fn list(
    State(state): State<Arc<AppState>>,
    AdminSession(_): AdminSession,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<UserProfile>>, AppError> {
    let users = state.users.list().await?;
    Ok(Json(params.filter(users)))
}

// First sign-in creates the profile; later calls return it unchanged
async fn register(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(dto): Json<RegisterProfileDto>,
) -> Result<Json<UserProfile>, AppError> {
    required(&dto.email, "Email is required")?;
    Ok(Json(state.users.register(&session.user_id, &dto).await?))
}

fn not_self(session: &Session, id: &str) -> Result<(), AppError> {
    if session.user_id == id {
        return Err(AppError::Validation(
            "You cannot change your own account".into(),
        ));
    }
    Ok(())
}

async fn toggle_status(
    State(state): State<Arc<AppState>>,
    AdminSession(session): AdminSession,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    not_self(&session, &id)?;
    let status = state.users.toggle_status(&id).await?;
    Ok(Json(json!({ "id": id, "status": status })))
}

async fn toggle_role(
    State(state): State<Arc<AppState>>,
    AdminSession(session): AdminSession,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    not_self(&session, &id)?;
    let role = state.users.toggle_role(&id).await?;
    Ok(Json(json!({ "id": id, "role": role })))
}

async fn remove(
    State(state): State<Arc<AppState>>,
    AdminSession(session): AdminSession,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    not_self(&session, &id)?;
    state.users.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::handlers::testing::*;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn register_is_idempotent() {
        let app = TestApp::new().await;
        let body = json!({"email": "new@uni.edu", "displayName": "New Student"});

        let (status, profile) = app.post("/api/users/me", Some("new-1"), body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["role"], "user");
        assert_eq!(profile["status"], "active");

        let (_, again) = app.post("/api/users/me", Some("new-1"), body).await;
        assert_eq!(again["createdAt"], profile["createdAt"]);
    }

    #[tokio::test]
    async fn admin_lists_and_searches() {
        let app = TestApp::new().await;

        let (status, users) = app.get("/api/users", Some(ADMIN)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(users.as_array().unwrap().len(), 2);

        let (_, hits) = app.get("/api/users?q=student@", Some(ADMIN)).await;
        assert_eq!(hits.as_array().unwrap().len(), 1);

        let (status, _) = app.get("/api/users", Some(STUDENT)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn suspended_user_loses_access() {
        let app = TestApp::new().await;

        let uri = format!("/api/users/{STUDENT}/status");
        let (status, body) = app.send(Method::POST, &uri, Some(ADMIN), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "suspended");

        let (status, body) = app.get("/api/courses/limit", Some(STUDENT)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Account suspended");

        app.send(Method::POST, &uri, Some(ADMIN), None).await;
        let (status, _) = app.get("/api/courses/limit", Some(STUDENT)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn promotion_grants_admin_routes() {
        let app = TestApp::new().await;

        let uri = format!("/api/users/{STUDENT}/role");
        let (_, body) = app.send(Method::POST, &uri, Some(ADMIN), None).await;
        assert_eq!(body["role"], "admin");

        let (status, _) = app.get("/api/users", Some(STUDENT)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn admins_cannot_change_themselves() {
        let app = TestApp::new().await;

        let uri = format!("/api/users/{ADMIN}/role");
        let (status, _) = app.send(Method::POST, &uri, Some(ADMIN), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let uri = format!("/api/users/{STUDENT}");
        let (status, _) = app.send(Method::DELETE, &uri, Some(ADMIN), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, users) = app.get("/api/users", Some(ADMIN)).await;
        assert_eq!(users.as_array().unwrap().len(), 1);
    }
}
