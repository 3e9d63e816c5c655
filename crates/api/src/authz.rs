//! Per-route permission guard.
//!
//! Runs inside the auth middleware, so a request that reaches it always
//! carries a [`PrincipalContext`].

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::MethodRouter,
};

use gatehouse_auth::{Permission, authorize};

use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

/// Authenticated -> Authorized: reject unless the token's snapshot holds `required`.
pub async fn require_permission(
    State(required): State<Permission>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = req
        .extensions()
        .get::<PrincipalContext>()
        .ok_or_else(|| ApiError::Unauthenticated("missing bearer token".to_string()))?;

    if let Err(e) = authorize(principal.principal(), &required) {
        tracing::info!(
            user_id = %principal.user_id(),
            permission = %required,
            "authorization denied"
        );
        return Err(e.into());
    }

    Ok(next.run(req).await)
}

/// Guard every handler of `route` with `permission`.
pub fn guarded<S>(route: MethodRouter<S>, permission: Permission) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    route.route_layer(middleware::from_fn_with_state(permission, require_permission))
}
