use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use liyaqa_api::{build_router, AppState};
use liyaqa_core::config::AppConfig;
use liyaqa_core::{InMemoryDirectory, Member, Money, NoOpSink};
use liyaqa_marketing::executor::RecordingNotifier;
use liyaqa_platform::tenancy::ProvisionTenant;
use liyaqa_platform::{PricingTier, TenantStatus};
use liyaqa_shop::types::CreateProduct;

const ADMIN_TOKEN: &str = "test-admin-token";

struct TestApp {
    router: Router,
    state: AppState,
}

fn setup() -> TestApp {
    let mut config = AppConfig::default();
    config.api.platform_admin_token = ADMIN_TOKEN.to_string();
    let state = AppState::new(
        &config,
        InMemoryDirectory::new(),
        Arc::new(RecordingNotifier::new()),
        Arc::new(NoOpSink),
    );
    TestApp {
        router: build_router(state.clone()),
        state,
    }
}

/// Provisions and activates a tenant; returns its id and a plaintext key.
fn tenant_with_key(app: &TestApp, subdomain: &str) -> (Uuid, String) {
    let actor = Uuid::new_v4();
    let tenant = app
        .state
        .tenants
        .provision(
            ProvisionTenant {
                facility_name: format!("{subdomain} gym"),
                subdomain: subdomain.to_string(),
                contact_email: format!("owner@{subdomain}.com"),
                tier: PricingTier::Professional,
            },
            actor,
        )
        .unwrap();
    app.state
        .tenants
        .change_status(tenant.id, TenantStatus::Active, actor)
        .unwrap();
    let key = app
        .state
        .api_keys
        .generate(tenant.id, "Front desk", vec![], None, actor)
        .unwrap();
    (tenant.id, key.plaintext)
}

fn member(app: &TestApp, tenant_id: Uuid) -> Uuid {
    let mut member = Member::new(tenant_id, "Sara", "Ali");
    member.email = Some("sara@example.com".into());
    app.state.directory.upsert_member(member).id
}

async fn call(
    router: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_string(&v).unwrap())
        }
        None => Body::empty(),
    };
    let resp = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let app = setup();
    let (status, body) = call(&app.router, "GET", "/health", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["node_id"], "node-01");

    let (status, _) = call(&app.router, "GET", "/live", &[], None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_tenant_routes_require_api_key() {
    let app = setup();
    let (status, body) = call(&app.router, "GET", "/api/marketing/campaigns", &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = call(
        &app.router,
        "GET",
        "/api/marketing/campaigns",
        &[("x-api-key", "lq_notarealkey")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_suspended_tenant_key_is_forbidden() {
    let app = setup();
    let (tenant_id, key) = tenant_with_key(&app, "paused-gym");
    app.state
        .tenants
        .suspend(tenant_id, "Unpaid invoices", Uuid::new_v4())
        .unwrap();
    let (status, body) = call(&app.router, "GET", "/api/members", &[("x-api-key", &key)], None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn test_platform_routes_require_admin_token() {
    let app = setup();
    let provision = json!({
        "facility_name": "Elite Fitness",
        "subdomain": "elite",
        "contact_email": "owner@elite.sa",
        "tier": "enterprise"
    });

    let (status, _) = call(&app.router, "POST", "/api/platform/tenants", &[], Some(provision.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong = [("authorization", "Bearer nope")];
    let (status, _) = call(&app.router, "POST", "/api/platform/tenants", &wrong, Some(provision.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let bearer = format!("Bearer {ADMIN_TOKEN}");
    let headers = [("authorization", bearer.as_str())];
    let (status, body) = call(&app.router, "POST", "/api/platform/tenants", &headers, Some(provision)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["subdomain"], "elite");
    assert_eq!(body["status"], "provisioning");

    let tenant_id = body["id"].as_str().unwrap().to_string();
    let (status, body) = call(
        &app.router,
        "POST",
        &format!("/api/platform/tenants/{tenant_id}/api-keys"),
        &headers,
        Some(json!({ "name": "POS" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["plaintext"].as_str().unwrap().starts_with("lq_"));
    assert!(body.get("key_hash").is_none());
}

#[tokio::test]
async fn test_campaign_lifecycle_over_http() {
    let app = setup();
    let (tenant_id, key) = tenant_with_key(&app, "lifecycle-gym");
    let member_id = member(&app, tenant_id);
    let auth = [("x-api-key", key.as_str())];

    let (status, campaign) = call(
        &app.router,
        "POST",
        "/api/marketing/campaigns",
        &auth,
        Some(json!({
            "name": "Welcome",
            "campaign_type": "welcome_sequence",
            "trigger_type": "manual"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(campaign["tenant_id"], tenant_id.to_string());
    assert_eq!(campaign["status"], "draft");
    let id = campaign["id"].as_str().unwrap().to_string();

    // Draft campaigns cannot be paused.
    let (status, body) = call(&app.router, "POST", &format!("/api/marketing/campaigns/{id}/pause"), &auth, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_state");

    // Activation needs a step.
    let (status, _) = call(&app.router, "POST", &format!("/api/marketing/campaigns/{id}/activate"), &auth, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app.router,
        "POST",
        &format!("/api/marketing/campaigns/{id}/steps"),
        &auth,
        Some(json!({
            "name": "Day 0",
            "channel": "email",
            "subject_en": "Welcome {{firstName}}",
            "body_en": "Hello {{firstName}}",
            "body_ar": "مرحبا {{firstName}}"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(&app.router, "POST", &format!("/api/marketing/campaigns/{id}/activate"), &auth, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");

    let (status, body) = call(
        &app.router,
        "POST",
        &format!("/api/marketing/campaigns/{id}/enroll"),
        &auth,
        Some(json!({ "member_ids": [member_id, Uuid::new_v4()] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enrolled"], 1);

    let (status, body) = call(
        &app.router,
        "GET",
        &format!("/api/marketing/campaigns/{id}/enrollments"),
        &auth,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_elements"], 1);
    assert_eq!(body["content"][0]["member_id"], member_id.to_string());
}

#[tokio::test]
async fn test_records_of_other_tenants_are_not_found() {
    let app = setup();
    let (_, key_a) = tenant_with_key(&app, "gym-a");
    let (_, key_b) = tenant_with_key(&app, "gym-b");

    let (status, campaign) = call(
        &app.router,
        "POST",
        "/api/marketing/campaigns",
        &[("x-api-key", &key_a)],
        Some(json!({
            "name": "Private",
            "campaign_type": "custom",
            "trigger_type": "manual"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/marketing/campaigns/{}", campaign["id"].as_str().unwrap());

    let (status, body) = call(&app.router, "GET", &uri, &[("x-api-key", &key_b)], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = call(&app.router, "GET", &uri, &[("x-api-key", &key_a)], None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = call(&app.router, "GET", "/api/marketing/campaigns", &[("x-api-key", &key_b)], None).await;
    assert_eq!(list["total_elements"], 0);
}

#[tokio::test]
async fn test_shop_order_checkout_takes_stock() {
    let app = setup();
    let (tenant_id, key) = tenant_with_key(&app, "shop-gym");
    let member_id = member(&app, tenant_id);
    let auth = [("x-api-key", key.as_str())];

    let product = app
        .state
        .catalog
        .create_product(CreateProduct::goods(tenant_id, "Water", Money::from_sar(5)).with_stock(10))
        .unwrap();
    app.state.catalog.publish(product.id).unwrap();

    let (status, order) = call(
        &app.router,
        "POST",
        "/api/shop/orders",
        &auth,
        Some(json!({ "member_id": member_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "cart");
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app.router,
        "POST",
        &format!("/api/shop/orders/{order_id}/items"),
        &auth,
        Some(json!({ "product_id": product.id, "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, order) = call(
        &app.router,
        "POST",
        &format!("/api/shop/orders/{order_id}/checkout"),
        &auth,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "pending");
    assert!(order["order_number"].as_str().unwrap().starts_with("ORD-"));

    let (_, stored) = call(&app.router, "GET", &format!("/api/shop/products/{}", product.id), &auth, None).await;
    assert_eq!(stored["stock_quantity"], 8);

    // Orders for members of another tenant are rejected.
    let (status, _) = call(
        &app.router,
        "POST",
        "/api/shop/orders",
        &auth,
        Some(json!({ "member_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_open_tracking_always_serves_pixel() {
    let app = setup();
    let req = Request::builder()
        .uri("/api/marketing/track/open/unknown-token")
        .body(Body::empty())
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "image/gif");

    let (status, _) = call(&app.router, "GET", "/api/marketing/track/click/unknown-token", &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_team_invite_accept_is_public() {
    let app = setup();
    let (tenant_id, key) = tenant_with_key(&app, "team-gym");

    let (status, invite) = call(
        &app.router,
        "POST",
        "/api/team/invites",
        &[("x-api-key", &key)],
        Some(json!({ "email": "Coach@Example.com", "role": "trainer" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(invite["email"], "coach@example.com");
    assert!(invite.get("token").is_none());

    let token = app.state.team.list(tenant_id, None)[0].token.clone();
    let (status, member) = call(
        &app.router,
        "POST",
        "/api/team/invites/accept",
        &[],
        Some(json!({ "token": token, "name": "Coach Omar" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(member["tenant_id"], tenant_id.to_string());

    let (_, members) = call(&app.router, "GET", "/api/team/members", &[("x-api-key", &key)], None).await;
    assert_eq!(members.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_platform_csv_export() {
    let app = setup();
    tenant_with_key(&app, "csv-gym");
    let req = Request::builder()
        .uri("/api/platform/analytics/export")
        .header("authorization", format!("Bearer {ADMIN_TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(csv.starts_with("id,facility_name"));
    assert!(csv.contains(",csv-gym,"));
}
