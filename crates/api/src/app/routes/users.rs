use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, rejection::JsonRejection},
    http::StatusCode,
};
use serde_json::{Value, json};

use gatehouse_auth::{NewUser, UserUpdate};
use gatehouse_core::UserId;

use crate::app::{errors::ApiError, services::AppServices};

pub async fn list(Extension(services): Extension<Arc<AppServices>>) -> Result<Json<Value>, ApiError> {
    let users = services.list_users().await?;
    Ok(Json(json!({ "users": users })))
}

pub async fn read(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let user = services.get_user(id.parse::<UserId>()?).await?;
    Ok(Json(json!({ "user": user })))
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<NewUser>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(input) = body?;
    let user = services.create_user(input).await?;
    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<UserUpdate>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = id.parse::<UserId>()?;
    let Json(update) = body?;
    let user = services.update_user(id, update).await?;
    Ok(Json(json!({ "user": user })))
}

pub async fn remove(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    services.delete_user(id.parse::<UserId>()?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Mint an email verification token for an out-of-band mailer.
pub async fn issue_verification(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let token = services.issue_verification(id.parse::<UserId>()?).await?;
    Ok(Json(json!({ "token": token })))
}
