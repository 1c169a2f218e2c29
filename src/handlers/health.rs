use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::mirror::MirrorState;
use crate::state::AppState;

fn label(state: MirrorState) -> String {
    format!("{:?}", state).to_lowercase()
}

// health handler
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let feeds = &state.feeds;
    let states = [
        ("announcements", feeds.announcements.state()),
        ("important", feeds.important.state()),
        ("courses", feeds.courses.state()),
        ("materials", feeds.materials.state()),
    ];
    let failed = states.iter().any(|(_, s)| *s == MirrorState::Failed);

    let mut feed_states = serde_json::Map::new();
    for (name, s) in states {
        feed_states.insert(name.to_string(), label(s).into());
    }

    let status = if failed { "degraded" } else { "healthy" };

    Json(serde_json::json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "feeds": feed_states,
    }))
}
