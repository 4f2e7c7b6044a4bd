use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use garrison_auth::Permission;
use garrison_core::{AssetId, BaseId};
use garrison_infra::{AssetDistribution, DriftReport, OpeningBalanceRequest, RepairReport};
use garrison_inventory::InventoryRecord;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/opening-balance", post(establish_opening_balance))
        .route("/reconcile", get(verify_ledger).post(repair_ledger))
        .route("/assets/:asset_id/distribution", get(asset_distribution))
        .route("/:asset_id/:base_id", get(get_record))
}

pub async fn establish_opening_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<OpeningBalanceRequest>,
) -> Result<Response, ApiError> {
    require(&principal, &Permission::ESTABLISH_OPENING_BALANCE)?;

    let record = services
        .run(move |s| s.engine().establish_opening_balance(&principal, body))
        .await?;

    Ok((StatusCode::CREATED, Json(record)).into_response())
}

pub async fn get_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((asset_id, base_id)): Path<(AssetId, BaseId)>,
) -> Result<Json<InventoryRecord>, ApiError> {
    require(&principal, &Permission::READ_INVENTORY)?;

    let record = services
        .run(move |s| s.engine().get_record(&principal, asset_id, base_id))
        .await?;

    Ok(Json(record))
}

pub async fn asset_distribution(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(asset_id): Path<AssetId>,
) -> Result<Json<AssetDistribution>, ApiError> {
    require(&principal, &Permission::READ_INVENTORY)?;

    let distribution = services
        .run(move |s| s.reports().asset_distribution(&principal, asset_id))
        .await?;

    Ok(Json(distribution))
}

pub async fn verify_ledger(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<DriftReport>, ApiError> {
    require(&principal, &Permission::RECONCILE)?;

    let report = services.run(|s| s.reconciler().verify()).await?;
    Ok(Json(report))
}

pub async fn repair_ledger(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<RepairReport>, ApiError> {
    require(&principal, &Permission::RECONCILE)?;

    let actor = principal.user_id();
    let report = services.run(move |s| s.reconciler().repair(actor)).await?;
    Ok(Json(report))
}
