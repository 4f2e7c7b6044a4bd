//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: storage backends, engine, reports and reconciler
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: response bodies
//! - `errors.rs`: error → status/body mapping

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router around already-wired services.
pub fn build_app(jwt_secret: &str, services: Arc<AppServices>) -> Router {
    let jwt = Arc::new(middleware::Hs256JwtValidator::new(jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    // Protected routes: require a valid bearer token.
    let protected = routes::router().layer(
        ServiceBuilder::new()
            .layer(Extension(services))
            .layer(axum::middleware::from_fn_with_state(
                auth_state,
                middleware::auth_middleware,
            )),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}
