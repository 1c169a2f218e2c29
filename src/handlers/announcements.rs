use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
};
use serde_json::json;

use super::{ListParams, required};
use crate::error::AppError;
use crate::models::{Announcement, CreateAnnouncementDto, UpdateAnnouncementDto};
use crate::session::AdminSession;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(recent).post(create))
        .route("/important", get(important))
        .route("/{id}", patch(update).delete(remove))
}

async fn recent(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Json<Vec<Announcement>> {
    Json(params.filter(state.feeds.announcements.snapshot()))
}

async fn important(State(state): State<Arc<AppState>>) -> Json<Vec<Announcement>> {
    Json(state.feeds.important.snapshot())
}

async fn create(
    State(state): State<Arc<AppState>>,
    AdminSession(session): AdminSession,
    Json(dto): Json<CreateAnnouncementDto>,
) -> Result<impl IntoResponse, AppError> {
    required(&dto.title, "Title is required")?;
    required(&dto.content, "Content is required")?;

    let id = state.announcements.create(&session, &dto).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

async fn update(
    State(state): State<Arc<AppState>>,
    AdminSession(_): AdminSession,
    Path(id): Path<String>,
    Json(dto): Json<UpdateAnnouncementDto>,
) -> Result<StatusCode, AppError> {
    if let Some(title) = &dto.title {
        required(title, "Title is required")?;
    }
    state.announcements.update(&id, &dto).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove(
    State(state): State<Arc<AppState>>,
    AdminSession(_): AdminSession,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.announcements.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
