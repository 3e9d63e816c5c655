use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};

use gatehouse_core::PermissionId;

use crate::app::{errors::ApiError, services::AppServices};

#[derive(Debug, Deserialize)]
pub struct GroupQuery {
    pub group: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePermissionsRequest {
    pub permissions: Vec<String>,
}

/// GET /v1/auth/permissions?group=
pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<GroupQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let permissions = services.list_permissions(query.group.as_deref()).await?;
    Ok(Json(json!({ "permissions": permissions })))
}

/// POST /v1/auth/permissions (all or nothing)
pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<CreatePermissionsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(req) = body?;
    let created = services.create_permissions(req.permissions).await?;
    Ok((StatusCode::CREATED, Json(json!({ "permissions": created }))))
}

/// DELETE /v1/auth/permissions/:id
pub async fn remove(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: PermissionId = id.parse()?;
    services.delete_permission(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
