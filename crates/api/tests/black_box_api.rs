use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use garrison_api::app::{self, AppServices};
use garrison_auth::{JwtClaims, Role};
use garrison_catalog::{Asset, AssetCategory, Base, InMemoryCatalog, UnitOfMeasure};
use garrison_core::{AssetId, BaseId, UserId};
use garrison_infra::EngineConfig;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    rifle: AssetId,
    alpha: BaseId,
    bravo: BaseId,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let catalog = Arc::new(InMemoryCatalog::new());
        let rifle = Asset::new("M4 Carbine", AssetCategory::Weapon, UnitOfMeasure::Piece)
            .with_minimum_stock_level(50);
        let alpha = Base::new("FL", "Fort Liberty");
        let bravo = Base::new("CP", "Camp Pendleton");
        let (rifle_id, alpha_id, bravo_id) = (rifle.id, alpha.id, bravo.id);
        catalog.upsert_asset(rifle).unwrap();
        catalog.upsert_base(alpha).unwrap();
        catalog.upsert_base(bravo).unwrap();

        let services = Arc::new(AppServices::in_memory(catalog, EngineConfig::default()));

        // Same router as prod, bound to an ephemeral port.
        let app = app::build_app(SECRET, services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            rifle: rifle_id,
            alpha: alpha_id,
            bravo: bravo_id,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(role: Role, base_id: Option<BaseId>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        role,
        base_id,
        issued_at: now - ChronoDuration::seconds(5),
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn admin() -> String {
    mint_jwt(Role::ADMIN, None)
}

async fn purchase(client: &reqwest::Client, srv: &TestServer, token: &str, base: BaseId, quantity: i64) -> reqwest::Response {
    client
        .post(srv.url("/transactions/purchase"))
        .bearer_auth(token)
        .json(&json!({
            "assetId": srv.rifle,
            "baseId": base,
            "quantity": quantity,
            "unitPrice": 125000,
            "vendor": { "name": "Colt Defense" },
            "purchaseOrderNumber": "PO-1001"
        }))
        .send()
        .await
        .unwrap()
}

async fn assign(client: &reqwest::Client, srv: &TestServer, token: &str, quantity: i64) -> reqwest::Response {
    client
        .post(srv.url("/transactions/assignment"))
        .bearer_auth(token)
        .json(&json!({
            "assetId": srv.rifle,
            "baseId": srv.alpha,
            "quantity": quantity,
            "assignedTo": { "personnelName": "J. Doe", "rank": "SGT" }
        }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/transactions")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url("/transactions"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn principal_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(Role::BASE_COMMANDER, Some(srv.alpha));

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["role"], "base_commander");
    assert_eq!(body["baseId"].as_str().unwrap(), srv.alpha.to_string());
}

#[tokio::test]
async fn purchase_transfer_assign_scenario() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = admin();

    let res = purchase(&client, &srv, &token, srv.alpha, 100).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["transaction"]["type"], "purchase");
    assert_eq!(body["transaction"]["totalValue"], 12_500_000);
    assert_eq!(body["record"]["currentBalance"], 100);

    let res = client
        .post(srv.url("/transactions/transfer"))
        .bearer_auth(&token)
        .json(&json!({
            "assetId": srv.rifle,
            "fromBaseId": srv.alpha,
            "toBaseId": srv.bravo,
            "quantity": 40
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["transferOut"]["type"], "transfer_out");
    assert_eq!(body["transferIn"]["type"], "transfer_in");
    assert_eq!(body["source"]["currentBalance"], 60);
    assert_eq!(body["destination"]["currentBalance"], 40);

    let res = assign(&client, &srv, &token, 50).await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = assign(&client, &srv, &token, 20).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["requested"], 20);
    assert_eq!(body["available"], 10);

    let res = client
        .get(srv.url(&format!("/inventory/{}/{}", srv.rifle, srv.alpha)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let record: serde_json::Value = res.json().await.unwrap();
    assert_eq!(record["currentBalance"], 60);
    assert_eq!(record["assignedQuantity"], 50);

    let res = client
        .get(srv.url("/transactions?limit=2"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let list: serde_json::Value = res.json().await.unwrap();
    assert_eq!(list["pagination"]["total"], 4);
    assert_eq!(list["pagination"]["pages"], 2);
    assert_eq!(list["transactions"].as_array().unwrap().len(), 2);
    assert_eq!(list["transactions"][0]["type"], "assignment");
}

#[tokio::test]
async fn zero_quantity_purchase_is_a_validation_error() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = admin();

    let res = purchase(&client, &srv, &token, srv.alpha, 0).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    let res = client
        .get(srv.url(&format!("/inventory/{}/{}", srv.rifle, srv.alpha)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn role_policy_and_base_scope_are_enforced() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let officer = mint_jwt(Role::LOGISTICS_OFFICER, Some(srv.alpha));

    // Officers may purchase at their own base only.
    let res = purchase(&client, &srv, &officer, srv.alpha, 10).await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = purchase(&client, &srv, &officer, srv.bravo, 10).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "access_denied");

    // Assignment is outside the officer role.
    let res = assign(&client, &srv, &officer, 1).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    // Listing another base is denied rather than silently emptied.
    let res = client
        .get(srv.url(&format!("/transactions?baseId={}", srv.bravo)))
        .bearer_auth(&officer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn opening_balance_is_set_once_and_admin_only() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let body = json!({ "assetId": srv.rifle, "baseId": srv.bravo, "quantity": 30 });

    let commander = mint_jwt(Role::BASE_COMMANDER, Some(srv.bravo));
    let res = client
        .post(srv.url("/inventory/opening-balance"))
        .bearer_auth(&commander)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let token = admin();
    let res = client
        .post(srv.url("/inventory/opening-balance"))
        .bearer_auth(&token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let record: serde_json::Value = res.json().await.unwrap();
    assert_eq!(record["openingBalance"], 30);
    assert_eq!(record["currentBalance"], 30);

    let res = client
        .post(srv.url("/inventory/opening-balance"))
        .bearer_auth(&token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dashboard_reports_totals_and_low_stock() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = admin();

    assert_eq!(purchase(&client, &srv, &token, srv.alpha, 100).await.status(), StatusCode::CREATED);
    assert_eq!(purchase(&client, &srv, &token, srv.bravo, 20).await.status(), StatusCode::CREATED);

    let res = client
        .get(srv.url("/dashboard/metrics"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let metrics: serde_json::Value = res.json().await.unwrap();
    assert_eq!(metrics["closingBalance"], 120);
    assert_eq!(metrics["purchases"], 120);
    assert_eq!(metrics["netMovement"], 120);

    let res = client
        .get(srv.url(&format!("/dashboard/movements?baseId={}", srv.alpha)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let movements: serde_json::Value = res.json().await.unwrap();
    assert_eq!(movements["pagination"]["total"], 1);

    // Minimum level is 50: only the 20 at bravo is short.
    let res = client
        .get(srv.url("/dashboard/low-stock"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let low: Vec<serde_json::Value> = res.json().await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0]["available"], 20);
    assert_eq!(low[0]["record"]["baseId"].as_str().unwrap(), srv.bravo.to_string());

    let res = client
        .get(srv.url("/dashboard/metrics?startDate=2030-01-02T00:00:00Z&endDate=2030-01-01T00:00:00Z"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reconcile_reports_a_clean_ledger() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = admin();

    assert_eq!(purchase(&client, &srv, &token, srv.alpha, 15).await.status(), StatusCode::CREATED);

    let res = client
        .get(srv.url("/inventory/reconcile"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["checked"], 1);
    assert!(report["drifts"].as_array().unwrap().is_empty());

    let res = client
        .post(srv.url("/inventory/reconcile"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let repair: serde_json::Value = res.json().await.unwrap();
    assert_eq!(repair["passes"], 1);
    assert!(repair["restored"].as_array().unwrap().is_empty());
    assert!(repair["skipped"].as_array().unwrap().is_empty());

    let officer = mint_jwt(Role::LOGISTICS_OFFICER, Some(srv.alpha));
    let res = client
        .post(srv.url("/inventory/reconcile"))
        .bearer_auth(&officer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}
