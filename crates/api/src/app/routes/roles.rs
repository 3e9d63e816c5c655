use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, rejection::JsonRejection},
    http::StatusCode,
};
use serde_json::{Value, json};

use gatehouse_auth::{NewRole, RoleUpdate};
use gatehouse_core::RoleId;

use crate::app::{errors::ApiError, services::AppServices};

pub async fn list(Extension(services): Extension<Arc<AppServices>>) -> Result<Json<Value>, ApiError> {
    let roles = services.list_roles().await?;
    Ok(Json(json!({ "roles": roles })))
}

pub async fn read(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let role = services.get_role(id.parse::<RoleId>()?).await?;
    Ok(Json(json!({ "role": role })))
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<NewRole>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(input) = body?;
    let role = services.create_role(input).await?;
    Ok((StatusCode::CREATED, Json(json!({ "role": role }))))
}

/// PATCH /v1/auth/roles/:id
///
/// Tokens already issued for this role keep their old snapshot until they expire.
pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<RoleUpdate>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = id.parse::<RoleId>()?;
    let Json(update) = body?;
    let role = services.update_role(id, update).await?;
    Ok(Json(json!({ "role": role })))
}

pub async fn remove(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    services.delete_role(id.parse::<RoleId>()?).await?;
    Ok(StatusCode::NO_CONTENT)
}
