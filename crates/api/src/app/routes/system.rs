use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "userId": principal.user_id().to_string(),
        "role": principal.role().as_str(),
        "baseId": principal.assigned_base().map(|b| b.to_string()),
    }))
}
