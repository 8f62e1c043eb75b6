//! HTTP surface over an in-memory store

mod common;

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use common::*;
use reviewdesk_server::ai::CompletionApi;
use reviewdesk_server::auth::generate_access_token;
use reviewdesk_server::build_router;
use reviewdesk_server::models::{Cabinet, ReviewStatus, UserRole};
use reviewdesk_server::payments::{signature, HashAlgorithm};
use reviewdesk_server::state::AppState;
use reviewdesk_server::store::{MemoryStore, PaymentStore, ReviewStore, Store};

const SECRET: &str = "test-jwt-secret";

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    marketplace: Arc<FakeMarketplace>,
    cabinet: Cabinet,
    owner_token: String,
}

async fn app_with_gateway(gateway: bool) -> TestApp {
    let owner = Uuid::new_v4();
    let (store, cabinet) = store_with_cabinet(owner).await;
    let marketplace = Arc::new(FakeMarketplace::with_feedbacks(feedbacks("fb", 3)));
    let completion: Arc<dyn CompletionApi> = Arc::new(FakeCompletion::answering("Спасибо!"));
    let dyn_store: Arc<dyn Store> = store.clone();

    let state = AppState::new(
        dyn_store,
        marketplace.clone(),
        Some(completion),
        SECRET,
        marketplace_config(10),
        completion_config(),
        gateway.then(gateway_config),
        None,
    );

    TestApp {
        router: build_router(state, CorsLayer::permissive()),
        store,
        marketplace,
        cabinet,
        owner_token: token(owner, UserRole::Seller),
    }
}

async fn app() -> TestApp {
    app_with_gateway(true).await
}

fn token(user_id: Uuid, role: UserRole) -> String {
    generate_access_token(user_id, role, SECRET, 900).unwrap()
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(router, request).await;
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let app = app().await;
    let (status, body) = send_json(&app.router, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "in-memory");
}

#[tokio::test]
async fn test_missing_and_invalid_tokens() {
    let app = app().await;

    let (status, body) =
        send_json(&app.router, request(Method::GET, "/api/balance", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "MISSING_TOKEN");

    let (status, body) = send_json(
        &app.router,
        request(Method::GET, "/api/balance", Some("not-a-jwt"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_balance_for_authenticated_user() {
    let app = app().await;
    let (status, body) = send_json(
        &app.router,
        request(Method::GET, "/api/balance", Some(&app.owner_token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["balance"], 0);
    assert_eq!(body["data"]["user_id"], app.cabinet.user_id.to_string());
}

#[tokio::test]
async fn test_sync_and_list_reviews() {
    let app = app().await;
    let uri = format!("/api/cabinets/{}/sync/reviews", app.cabinet.id);

    let (status, body) = send_json(
        &app.router,
        request(Method::POST, &uri, Some(&app.owner_token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["fetched"], 3);
    assert_eq!(body["data"]["inserted"], 3);

    let list = format!("/api/cabinets/{}/reviews?status=new", app.cabinet.id);
    let (status, body) = send_json(
        &app.router,
        request(Method::GET, &list, Some(&app.owner_token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_foreign_cabinet_is_forbidden() {
    let app = app().await;
    let stranger = token(Uuid::new_v4(), UserRole::Seller);
    let uri = format!("/api/cabinets/{}/sync/reviews", app.cabinet.id);

    let (status, body) =
        send_json(&app.router, request(Method::POST, &uri, Some(&stranger), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
    assert!(app.marketplace.feedback_requests.lock().unwrap().is_empty());

    // Admins may act on any cabinet
    let admin = token(Uuid::new_v4(), UserRole::Admin);
    let (status, _) = send_json(&app.router, request(Method::POST, &uri, Some(&admin), None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_draft_then_reply_without_balance() {
    let app = app().await;
    let review = review(app.cabinet.id, ReviewStatus::New, 5);
    app.store.insert_review(review.clone()).await;

    let (status, body) = send_json(
        &app.router,
        request(
            Method::POST,
            &format!("/api/reviews/{}/draft", review.id),
            Some(&app.owner_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["ai_draft"], "Спасибо!");

    let (status, body) = send_json(
        &app.router,
        request(
            Method::POST,
            &format!("/api/reviews/{}/reply", review.id),
            Some(&app.owner_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_BALANCE");
    assert!(app.marketplace.replies().is_empty());
}

#[tokio::test]
async fn test_status_override_requires_admin() {
    let app = app().await;
    let review = review(app.cabinet.id, ReviewStatus::Sent, 5);
    app.store.insert_review(review.clone()).await;
    let uri = format!("/api/reviews/{}/status", review.id);
    let body = json!({ "status": "archived" });

    let (status, _) = send_json(
        &app.router,
        request(Method::PUT, &uri, Some(&app.owner_token), Some(body.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = token(Uuid::new_v4(), UserRole::Admin);
    let (status, response) =
        send_json(&app.router, request(Method::PUT, &uri, Some(&admin), Some(body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"]["status"], "archived");

    let stored = app.store.get_review(review.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReviewStatus::Archived);
}

#[tokio::test]
async fn test_admin_adjustment() {
    let app = app().await;
    let admin = token(Uuid::new_v4(), UserRole::Admin);
    let body = json!({
        "user_id": app.cabinet.user_id,
        "amount": 25,
        "description": "Компенсация"
    });

    let (status, response) = send_json(
        &app.router,
        request(Method::POST, "/api/admin/ledger/adjust", Some(&admin), Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"]["transaction_type"], "admin");
    assert_eq!(response["data"]["balance_after"], 25);

    let (_, balance) = send_json(
        &app.router,
        request(Method::GET, "/api/balance", Some(&app.owner_token), None),
    )
    .await;
    assert_eq!(balance["data"]["balance"], 25);

    let (status, history) = send_json(
        &app.router,
        request(
            Method::GET,
            "/api/transactions?type=admin",
            Some(&app.owner_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_chat_message_too_long() {
    let app = app().await;
    *app.marketplace.chats.lock().unwrap() = vec![chat_info("c1", "sign-1")];
    let sync = format!("/api/cabinets/{}/sync/chats", app.cabinet.id);
    let (status, _) =
        send_json(&app.router, request(Method::POST, &sync, Some(&app.owner_token), None)).await;
    assert_eq!(status, StatusCode::OK);

    let chat = app.store.chat_by_external(app.cabinet.id, "c1").await.unwrap();
    let uri = format!("/api/chats/{}/messages", chat.id);
    let body = json!({ "text": "x".repeat(1001) });

    let (status, body) = send_json(
        &app.router,
        request(Method::POST, &uri, Some(&app.owner_token), Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(app.marketplace.messages().is_empty());
}

#[tokio::test]
async fn test_payment_flow_over_http() {
    let app = app().await;

    let (status, body) = send_json(
        &app.router,
        request(
            Method::POST,
            "/api/payments",
            Some(&app.owner_token),
            Some(json!({ "amount": 990, "tokens": 200 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let invoice_id = body["data"]["invoice_id"].as_i64().unwrap();
    assert!(body["data"]["redirect_url"]
        .as_str()
        .unwrap()
        .contains("MerchantLogin=shop"));

    let inv = invoice_id.to_string();
    let sig = signature::sign(HashAlgorithm::Sha256, &["990.000000", inv.as_str(), "secret2"]);
    let form = format!("OutSum=990.000000&InvId={}&SignatureValue={}", inv, sig);

    // Form POST, then the same notification again as a GET query
    let post = Request::builder()
        .method(Method::POST)
        .uri("/api/payments/result")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.clone()))
        .unwrap();
    let (status, bytes) = send(&app.router, post).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(bytes).unwrap(), format!("OK{}", invoice_id));

    let get = request(Method::GET, &format!("/api/payments/result?{}", form), None, None);
    let (status, bytes) = send(&app.router, get).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(bytes).unwrap(), format!("OK{}", invoice_id));

    let json_body = json!({ "OutSum": "990.000000", "InvId": invoice_id, "SignatureValue": sig });
    let (status, bytes) = send(
        &app.router,
        request(Method::POST, "/api/payments/result", None, Some(json_body)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(bytes).unwrap(), format!("OK{}", invoice_id));

    let (_, balance) = send_json(
        &app.router,
        request(Method::GET, "/api/balance", Some(&app.owner_token), None),
    )
    .await;
    assert_eq!(balance["data"]["balance"], 200);
    assert!(app.store.find_by_invoice(invoice_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_bad_webhook_signature_is_rejected() {
    let app = app().await;
    let form = "OutSum=990&InvId=1000&SignatureValue=00ff";
    let (status, _) = send(
        &app.router,
        request(Method::GET, &format!("/api/payments/result?{}", form), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unconfigured_gateway_is_unavailable() {
    let app = app_with_gateway(false).await;
    let (status, body) = send_json(
        &app.router,
        request(
            Method::POST,
            "/api/payments",
            None,
            Some(json!({ "amount": 990, "tokens": 200 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
}
