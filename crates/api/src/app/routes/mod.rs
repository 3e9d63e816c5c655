use axum::{
    Router,
    routing::{delete, get, patch, post},
};

use gatehouse_auth::builtin;

use crate::authz::guarded;

pub mod auth;
pub mod permissions;
pub mod roles;
pub mod system;
pub mod users;

/// Routes reachable without a token.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/verify-email", get(auth::verify_email))
}

/// Routes behind the auth middleware. Each RBAC route carries its own
/// permission guard.
pub fn protected_router() -> Router {
    Router::new()
        .route("/me", get(system::me))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route(
            "/permissions",
            guarded(get(permissions::list), builtin::PERMISSIONS_LIST)
                .merge(guarded(post(permissions::create), builtin::PERMISSIONS_CREATE)),
        )
        .route(
            "/permissions/:id",
            guarded(delete(permissions::remove), builtin::PERMISSIONS_DELETE),
        )
        .route(
            "/roles",
            guarded(get(roles::list), builtin::ROLES_LIST)
                .merge(guarded(post(roles::create), builtin::ROLES_CREATE)),
        )
        .route(
            "/roles/:id",
            guarded(get(roles::read), builtin::ROLES_READ)
                .merge(guarded(patch(roles::update), builtin::ROLES_UPDATE))
                .merge(guarded(delete(roles::remove), builtin::ROLES_DELETE)),
        )
        .route(
            "/users",
            guarded(get(users::list), builtin::USERS_READ)
                .merge(guarded(post(users::create), builtin::USERS_CREATE)),
        )
        .route(
            "/users/:id",
            guarded(get(users::read), builtin::USERS_READ)
                .merge(guarded(patch(users::update), builtin::USERS_UPDATE))
                .merge(guarded(delete(users::remove), builtin::USERS_DELETE)),
        )
        .route(
            "/users/:id/verification",
            guarded(post(users::issue_verification), builtin::USERS_UPDATE),
        )
}
