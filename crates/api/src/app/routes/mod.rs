use axum::{routing::get, Router};

pub mod dashboard;
pub mod inventory;
pub mod system;
pub mod transactions;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/transactions", transactions::router())
        .nest("/inventory", inventory::router())
        .nest("/dashboard", dashboard::router())
}
