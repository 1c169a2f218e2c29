use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
};
use serde_json::json;

use super::{ListParams, required};
use crate::error::AppError;
use crate::models::{Course, CreateCourseDto, Level, UpdateCourseDto};
use crate::rate_limit::{Admission, LimitStatus};
use crate::services::courses::ALL_LIMIT;
use crate::session::{AdminSession, Session};
use crate::state::AppState;
use crate::youtube;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(published).post(create))
        .route("/all", get(all))
        .route("/limit", get(monthly_limit))
        .route("/category/{category}", get(by_category))
        .route("/level/{level}", get(by_level))
        .route("/{id}", patch(update).delete(remove))
}

async fn published(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Json<Vec<Course>> {
    Json(params.filter(state.feeds.courses.snapshot()))
}

// Drafts included
async fn all(
    State(state): State<Arc<AppState>>,
    AdminSession(_): AdminSession,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Course>>, AppError> {
    let courses = state.courses.all(params.limit.unwrap_or(ALL_LIMIT)).await?;
    Ok(Json(params.filter(courses)))
}

async fn by_category(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Course>>, AppError> {
    let limit = params.limit.unwrap_or(state.config.course_limit);
    let courses = state.courses.by_category(&category, limit).await?;
    Ok(Json(params.filter(courses)))
}

async fn by_level(
    State(state): State<Arc<AppState>>,
    Path(level): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Course>>, AppError> {
    let level: Level = level.parse().map_err(AppError::Validation)?;
    let limit = params.limit.unwrap_or(state.config.course_limit);
    let courses = state.courses.by_level(level, limit).await?;
    Ok(Json(params.filter(courses)))
}

async fn monthly_limit(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<LimitStatus>, AppError> {
    Ok(Json(state.courses.monthly_limit(&session).await?))
}

async fn create(
    State(state): State<Arc<AppState>>,
    AdminSession(session): AdminSession,
    Json(dto): Json<CreateCourseDto>,
) -> Result<Response, AppError> {
    dto.validate().map_err(AppError::Validation)?;

    let response = match state.courses.create(&session, &dto).await? {
        Admission::Admitted(id) => (StatusCode::CREATED, Json(json!({ "id": id }))).into_response(),
        Admission::Rejected { count, limit } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": Admission::rejection_message(count, limit),
                "count": count,
                "limit": limit,
            })),
        )
            .into_response(),
    };
    Ok(response)
}

async fn update(
    State(state): State<Arc<AppState>>,
    AdminSession(_): AdminSession,
    Path(id): Path<String>,
    Json(dto): Json<UpdateCourseDto>,
) -> Result<StatusCode, AppError> {
    if let Some(title) = &dto.title {
        required(title, "Title is required")?;
    }
    if let Some(url) = &dto.youtube_url {
        if !youtube::is_youtube_url(url) {
            return Err(AppError::Validation("Please enter a valid YouTube URL".into()));
        }
    }
    state.courses.update(&id, &dto).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove(
    State(state): State<Arc<AppState>>,
    AdminSession(_): AdminSession,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.courses.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
