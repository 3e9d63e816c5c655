use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{
        Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};

use gatehouse_auth::NewUser;

use crate::app::{errors::ApiError, services::AppServices};
use crate::context::PrincipalContext;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /v1/auth/login
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body?;
    let (token, user) = services.login(&req.email, &req.password).await?;
    Ok(Json(json!({ "token": token, "user": user })))
}

/// POST /v1/auth/register
///
/// Activation flags in the body are ignored.
pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<NewUser>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(input) = body?;
    let user = services.register(input).await?;
    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: String,
}

/// GET /v1/auth/verify-email?token=
pub async fn verify_email(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<VerifyEmailQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let user = services.verify_email(&query.token).await?;
    Ok(Json(json!({ "user": user })))
}

/// POST /v1/auth/refresh
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<Value>, ApiError> {
    let token = services.refresh(principal.user_id()).await?;
    Ok(Json(json!({ "token": token })))
}

/// POST /v1/auth/logout
///
/// Tokens are stateless; there is nothing to invalidate server-side.
pub async fn logout(Extension(principal): Extension<PrincipalContext>) -> Json<Value> {
    tracing::info!(user_id = %principal.user_id(), "logout acknowledged");
    Json(json!({ "message": "logged out; discard the token" }))
}
