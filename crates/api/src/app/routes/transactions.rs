use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use garrison_auth::Permission;
use garrison_infra::{
    AssignmentRequest, ExpenditureRequest, PurchaseRequest, ReturnRequest, TransactionQuery,
    TransferRequest,
};

use crate::app::dto::{TransactionCreated, TransactionList, TransferCreated};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_transactions))
        .route("/purchase", post(record_purchase))
        .route("/transfer", post(record_transfer))
        .route("/assignment", post(record_assignment))
        .route("/expenditure", post(record_expenditure))
        .route("/return", post(record_return))
}

pub async fn record_purchase(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<PurchaseRequest>,
) -> Result<Response, ApiError> {
    require(&principal, &Permission::RECORD_PURCHASE)?;

    let receipt = services
        .run(move |s| s.engine().record_purchase(&principal, body))
        .await?;

    Ok(created(TransactionCreated::new("Purchase recorded successfully", receipt)))
}

pub async fn record_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<TransferRequest>,
) -> Result<Response, ApiError> {
    require(&principal, &Permission::RECORD_TRANSFER)?;

    let receipt = services
        .run(move |s| s.engine().record_transfer(&principal, body))
        .await?;

    Ok(created(TransferCreated {
        message: "Transfer completed successfully",
        receipt,
    }))
}

pub async fn record_assignment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<AssignmentRequest>,
) -> Result<Response, ApiError> {
    require(&principal, &Permission::RECORD_ASSIGNMENT)?;

    let receipt = services
        .run(move |s| s.engine().record_assignment(&principal, body))
        .await?;

    Ok(created(TransactionCreated::new("Assignment recorded successfully", receipt)))
}

pub async fn record_expenditure(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ExpenditureRequest>,
) -> Result<Response, ApiError> {
    require(&principal, &Permission::RECORD_EXPENDITURE)?;

    let receipt = services
        .run(move |s| s.engine().record_expenditure(&principal, body))
        .await?;

    Ok(created(TransactionCreated::new("Expenditure recorded successfully", receipt)))
}

pub async fn record_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ReturnRequest>,
) -> Result<Response, ApiError> {
    require(&principal, &Permission::RECORD_RETURN)?;

    let receipt = services
        .run(move |s| s.engine().record_return(&principal, body))
        .await?;

    Ok(created(TransactionCreated::new("Return recorded successfully", receipt)))
}

pub async fn list_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<TransactionList>, ApiError> {
    require(&principal, &Permission::READ_TRANSACTIONS)?;

    let page = services
        .run(move |s| s.engine().list_transactions(&principal, &query))
        .await?;

    Ok(Json(page.into()))
}

fn created<T: serde::Serialize>(body: T) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}
