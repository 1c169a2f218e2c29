use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

// Failures coming back from the document store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    // Recoverable: the store can answer the query without server-side ordering
    #[error("missing composite index: {0}")]
    IndexMissing(String),

    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("malformed document {id}: {reason}")]
    Malformed { id: String, reason: String },
}

impl StoreError {
    pub fn is_index_missing(&self) -> bool {
        matches!(self, StoreError::IndexMissing(_))
    }

    pub fn unavailable(reason: impl std::fmt::Display) -> Self {
        StoreError::BackendUnavailable(reason.to_string())
    }
}

// Errors returned from HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("admin access required")]
    Forbidden,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Store(StoreError::BackendUnavailable(reason)) => {
                tracing::error!(%reason, "document store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Backend unavailable, please retry".to_string(),
                )
            }
            AppError::Store(StoreError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            AppError::Store(err) => {
                tracing::error!(error = %err, "internal store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn response_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unavailable_store_maps_to_503_retry_message() {
        let err = AppError::from(StoreError::unavailable("connection refused"));
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = response_body(response).await;
        assert_eq!(body["error"], "Backend unavailable, please retry");
    }

    #[tokio::test]
    async fn malformed_document_hides_details() {
        let err = AppError::from(StoreError::Malformed {
            id: "abc".into(),
            reason: "missing field `secret`".into(),
        });
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response_body(response).await.to_string();
        assert!(!body.contains("secret"));
    }

    #[tokio::test]
    async fn not_found_maps_to_404() {
        let err = AppError::from(StoreError::NotFound {
            collection: "courses".into(),
            id: "c1".into(),
        });
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn validation_returns_400_with_message() {
        let response = AppError::Validation("Title is required".into()).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response_body(response).await["error"], "Title is required");
    }

    #[test]
    fn only_index_missing_is_recoverable() {
        assert!(StoreError::IndexMissing("courses".into()).is_index_missing());
        assert!(!StoreError::unavailable("down").is_index_missing());
    }
}
