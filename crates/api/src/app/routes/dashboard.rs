use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    routing::get,
    Json, Router,
};

use garrison_auth::Permission;
use garrison_infra::{DashboardMetrics, LowStockEntry, MovementQuery, ScopeRequest};

use crate::app::dto::TransactionList;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/movements", get(movements))
        .route("/low-stock", get(low_stock))
}

pub async fn metrics(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(scope): Query<ScopeRequest>,
) -> Result<Json<DashboardMetrics>, ApiError> {
    require(&principal, &Permission::READ_DASHBOARD)?;

    let metrics = services
        .run(move |s| s.reports().dashboard_metrics(&principal, &scope))
        .await?;

    Ok(Json(metrics))
}

pub async fn movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<MovementQuery>,
) -> Result<Json<TransactionList>, ApiError> {
    require(&principal, &Permission::READ_DASHBOARD)?;

    let page = services
        .run(move |s| s.reports().movement_details(&principal, &query))
        .await?;

    Ok(Json(page.into()))
}

pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(scope): Query<ScopeRequest>,
) -> Result<Json<Vec<LowStockEntry>>, ApiError> {
    require(&principal, &Permission::READ_DASHBOARD)?;

    let entries = services
        .run(move |s| s.reports().low_stock(&principal, &scope))
        .await?;

    Ok(Json(entries))
}
