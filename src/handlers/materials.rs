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
use crate::models::{CreateMaterialDto, Material, UpdateMaterialDto};
use crate::session::AdminSession;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(recent).post(create))
        .route("/course/{course_id}", get(by_course))
        .route("/{id}", patch(update).delete(remove))
}

async fn recent(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Json<Vec<Material>> {
    Json(params.filter(state.feeds.materials.snapshot()))
}

async fn by_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Material>>, AppError> {
    let materials = state.materials.by_course(&course_id).await?;
    Ok(Json(params.filter(materials)))
}

async fn create(
    State(state): State<Arc<AppState>>,
    AdminSession(session): AdminSession,
    Json(dto): Json<CreateMaterialDto>,
) -> Result<impl IntoResponse, AppError> {
    required(&dto.title, "Title is required")?;
    required(&dto.course_code, "Course code is required")?;
    required(&dto.file_url, "File URL is required")?;

    let id = state.materials.create(&session, &dto).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

async fn update(
    State(state): State<Arc<AppState>>,
    AdminSession(_): AdminSession,
    Path(id): Path<String>,
    Json(dto): Json<UpdateMaterialDto>,
) -> Result<StatusCode, AppError> {
    state.materials.update(&id, &dto).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove(
    State(state): State<Arc<AppState>>,
    AdminSession(_): AdminSession,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.materials.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::handlers::testing::*;
    use axum::http::{Method, StatusCode};
    use chrono::TimeDelta;
    use serde_json::{Value, json};

    fn material(title: &str, code: &str, course_id: &str) -> Value {
        json!({
            "title": title,
            "courseCode": code,
            "courseName": "Operating Systems",
            "fileUrl": format!("https://files.example.edu/{code}.pdf"),
            "fileType": "PDF",
            "fileSize": "2.4 MB",
            "courseId": course_id,
        })
    }

    #[tokio::test]
    async fn uploads_show_up_newest_first() {
        let app = TestApp::new().await;
        for week in 1..=6 {
            let (status, _) = app
                .post("/api/materials", Some(ADMIN), material(&format!("Week {week}"), "CS302", "c1"))
                .await;
            assert_eq!(status, StatusCode::CREATED);
            app.clock.advance(TimeDelta::days(7));
        }

        settled(&app.state.feeds.materials, 5).await;
        let (_, recent) = app.get("/api/materials", None).await;
        assert_eq!(recent[0]["title"], "Week 6");
        assert_eq!(recent[0]["uploadedByName"], "Dr. Test");
        assert_eq!(recent[4]["title"], "Week 2");
    }

    #[tokio::test]
    async fn course_listing_and_search() {
        let app = TestApp::new().await;
        app.post("/api/materials", Some(ADMIN), material("Scheduling", "CS302", "c1")).await;
        app.post("/api/materials", Some(ADMIN), material("Paging", "CS302", "c1")).await;
        app.post("/api/materials", Some(ADMIN), material("Graphs", "CS210", "c2")).await;

        let (_, c1) = app.get("/api/materials/course/c1", None).await;
        assert_eq!(c1.as_array().unwrap().len(), 2);

        let (_, hits) = app.get("/api/materials/course/c1?q=pag", None).await;
        assert_eq!(hits.as_array().unwrap().len(), 1);
        assert_eq!(hits[0]["title"], "Paging");
    }

    #[tokio::test]
    async fn missing_file_url_is_rejected() {
        let app = TestApp::new().await;
        let mut body = material("Notes", "CS302", "c1");
        body["fileUrl"] = json!("");

        let (status, err) = app.post("/api/materials", Some(ADMIN), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"], "File URL is required");
    }

    #[tokio::test]
    async fn admin_edits_and_removes() {
        let app = TestApp::new().await;
        let (_, created) = app
            .post("/api/materials", Some(ADMIN), material("Notes", "CS302", "c1"))
            .await;
        let uri = format!("/api/materials/{}", created["id"].as_str().unwrap());

        let (status, _) = app
            .send(Method::PATCH, &uri, Some(STUDENT), Some(json!({"title": "Mine now"})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .send(Method::PATCH, &uri, Some(ADMIN), Some(json!({"fileSize": "3 MB"})))
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app.send(Method::DELETE, &uri, Some(ADMIN), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, c1) = app.get("/api/materials/course/c1", None).await;
        assert!(c1.as_array().unwrap().is_empty());
    }
}
