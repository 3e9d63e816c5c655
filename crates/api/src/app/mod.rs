//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/token/hasher wiring and the request flows
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `errors.rs`: consistent JSON error responses

use std::sync::Arc;

use anyhow::Context;
use axum::{Extension, Router};
use tower::ServiceBuilder;

use gatehouse_auth::{Hs256Tokens, PasswordHasher};
use gatehouse_infra::{InMemoryRbacStore, PostgresRbacStore, RbacStore, bootstrap};

use crate::config::Config;
use crate::middleware;

pub mod errors;
pub mod routes;
pub mod services;

/// Every route lives under this prefix.
pub const BASE_PATH: &str = "/v1/auth";

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// Connects the store named by the config, seeds it, and wires the routes.
pub async fn build_app(config: Config) -> anyhow::Result<Router> {
    let store: Arc<dyn RbacStore> = match &config.database_url {
        Some(url) => Arc::new(
            PostgresRbacStore::connect(url, config.store_timeout)
                .await
                .context("connecting to postgres")?,
        ),
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store");
            Arc::new(InMemoryRbacStore::new())
        }
    };

    let hasher = PasswordHasher::new(config.bcrypt_cost).context("invalid BCRYPT_COST")?;
    bootstrap(store.as_ref(), &hasher).await?;

    let tokens = Arc::new(Hs256Tokens::new(config.jwt_secret.as_bytes()));
    let services = services::AppServices::new(
        store,
        tokens.clone(),
        tokens.clone(),
        hasher,
        config.token_ttl_hours,
    )
    .context("building services")?;

    Ok(build_router(Arc::new(services), tokens))
}

/// Wire routes around already-built services.
pub fn build_router(services: Arc<services::AppServices>, tokens: Arc<Hs256Tokens>) -> Router {
    let auth_state = middleware::AuthState { jwt: tokens };

    // Authentication wraps every protected route; permission guards sit inside it.
    let protected = routes::protected_router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    let api = routes::public_router()
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services)));

    Router::new().nest(BASE_PATH, api)
}
