mod announcements;
mod courses;
mod health;
mod materials;
mod metrics;
mod users;

pub use health::health_handler;
pub use metrics::metrics_handler;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::metrics::{REQUEST_LATENCY, REQUEST_TOTAL};
use crate::models::{Searchable, search};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/api/announcements", announcements::router())
        .nest("/api/courses", courses::router())
        .nest("/api/materials", materials::router())
        .nest("/api/users", users::router())
        .layer(middleware::from_fn(track_requests))
        .with_state(state)
}

// track every request
async fn track_requests(req: Request, next: Next) -> Response {
    REQUEST_TOTAL.inc();
    let start_time = Instant::now();
    let response = next.run(req).await;
    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
    response
}

// ?q=term&limit=n
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

impl ListParams {
    fn filter<T: Searchable + Clone>(&self, items: Vec<T>) -> Vec<T> {
        match self.q.as_deref() {
            Some(term) => search(&items, term),
            None => items,
        }
    }
}

fn required(value: &str, message: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(message.to_string()));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        Router,
        body::Body,
        http::{Method, Request, StatusCode, header},
    };
    use chrono::{DateTime, Utc};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::clock::ManualClock;
    use crate::config::PortalConfig;
    use crate::mirror::LiveList;
    use crate::models::{Record, RegisterProfileDto};
    use crate::session::{USER_ID_HEADER, USER_NAME_HEADER};
    use crate::state::AppState;
    use crate::store::MemoryStore;

    pub const ADMIN: &str = "admin-1";
    pub const STUDENT: &str = "student-1";

    pub struct TestApp {
        pub store: MemoryStore,
        pub clock: Arc<ManualClock>,
        pub state: Arc<AppState>,
    }

    impl TestApp {
        // One admin and one student profile
        pub async fn new() -> Self {
            let store = MemoryStore::new();
            let start: DateTime<Utc> = "2024-03-15T09:00:00Z".parse().unwrap();
            let clock = Arc::new(ManualClock::new(start));
            let state = Arc::new(AppState::new(
                Arc::new(store.clone()),
                clock.clone(),
                PortalConfig::default(),
            ));

            for (id, email) in [(ADMIN, "admin@uni.edu"), (STUDENT, "student@uni.edu")] {
                let dto = RegisterProfileDto {
                    email: email.into(),
                    display_name: None,
                };
                state.users.register(id, &dto).await.unwrap();
            }
            state.users.toggle_role(ADMIN).await.unwrap();

            Self {
                store,
                clock,
                state,
            }
        }

        pub fn router(&self) -> Router {
            super::router(Arc::clone(&self.state))
        }

        pub async fn send(
            &self,
            method: Method,
            uri: &str,
            user: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(user) = user {
                request = request
                    .header(USER_ID_HEADER, user)
                    .header(USER_NAME_HEADER, "Dr. Test");
            }
            let request = match body {
                Some(body) => request
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string())),
                None => request.body(Body::empty()),
            }
            .unwrap();

            let response = self.router().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, body)
        }

        pub async fn get(&self, uri: &str, user: Option<&str>) -> (StatusCode, Value) {
            self.send(Method::GET, uri, user, None).await
        }

        pub async fn post(&self, uri: &str, user: Option<&str>, body: Value) -> (StatusCode, Value) {
            self.send(Method::POST, uri, user, Some(body)).await
        }
    }

    // Wait until a live list holds `len` items
    pub async fn settled<T: Record + Clone + Sync>(list: &LiveList<T>, len: usize) {
        let mut rx = list.watch();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|items| items.len() == len))
            .await
            .expect("live list did not settle")
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = TestApp::new().await;
        let (status, _) = app.get("/api/nothing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unavailable_store_maps_to_503() {
        let app = TestApp::new().await;
        app.store.set_available(false);

        let (status, body) = app.get("/api/courses/limit", Some(ADMIN)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Backend unavailable, please retry");
    }
}
