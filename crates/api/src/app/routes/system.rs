use axum::{Extension, Json, http::StatusCode};
use serde_json::{Value, json};

use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Identity and permission snapshot exactly as carried by the presented token.
pub async fn me(Extension(principal): Extension<PrincipalContext>) -> Json<Value> {
    Json(json!({
        "userId": principal.user_id(),
        "role": principal.role_id(),
        "permissions": principal.permissions(),
    }))
}
