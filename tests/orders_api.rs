//! End-to-end order flows through the HTTP router.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_orders::api::{self, AppState};
use storefront_orders::domain::pricing::PricingPolicy;
use storefront_orders::identity::StaticIdentityProvider;
use storefront_orders::store::MemoryOrderStore;
use storefront_orders::{Caller, OrderService};

const ADMIN: &str = "admin-token";
const ALICE: &str = "alice-token";
const BOB: &str = "bob-token";

struct TestApp {
    router: Router,
    store: MemoryOrderStore,
    alice: Uuid,
}

fn app() -> TestApp {
    let store = MemoryOrderStore::new();
    let alice = Uuid::new_v4();
    let identity = StaticIdentityProvider::default()
        .with_token(ADMIN, Caller::Admin(Uuid::new_v4()))
        .with_token(ALICE, Caller::Customer(alice))
        .with_token(BOB, Caller::Customer(Uuid::new_v4()));
    let service = OrderService::new(Arc::new(store.clone()), PricingPolicy::default());
    TestApp { router: api::router(AppState::new(service, identity)), store, alice }
}

fn draft() -> Value {
    json!({
        "orderData": {
            "contact": { "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com", "phone": "+1 555 010 2030" },
            "shippingAddress": { "address": "12 Analytical Way", "city": "Springfield", "state": "IL", "zip": "62701", "country": "US" },
            "billingSameAsShipping": true,
            "shippingOption": "standard",
            "paymentMethod": "credit_card",
            "notes": "Leave at the door"
        },
        "orderItems": [
            { "productId": 1, "name": "Teapot", "unitPrice": "20.00", "quantity": 2 },
            { "productId": 2, "name": "Cup", "unitPrice": "15.00", "quantity": 1, "imageRef": "/img/cup.png" }
        ]
    })
}

impl TestApp {
    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        self.send_with(method, uri, token, body, None).await
    }

    async fn send_with(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        idempotency_key: Option<Uuid>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key.to_string());
        }
        let request = match body {
            Some(body) => request.header(header::CONTENT_TYPE, "application/json").body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, json)
    }

    async fn place(&self, token: Option<&str>) -> Value {
        let (status, order) = self.send(Method::POST, "/orders", token, Some(draft())).await;
        assert_eq!(status, StatusCode::CREATED, "{order}");
        order
    }
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_guest_order_is_priced_on_the_server() {
    let app = app();
    let order = app.place(None).await;

    assert_eq!(order["subtotal"], "55.00");
    assert_eq!(order["shipping"], "15.00");
    assert_eq!(order["tax"], "3.85");
    assert_eq!(order["total"], "73.85");
    assert_eq!(order["status"], "pending");
    assert_eq!(order["paymentStatus"], "pending");
    assert_eq!(order["ownerId"], Value::Null);
    assert!(order["orderNumber"].as_str().unwrap().starts_with("ORD-"));
    assert_eq!(order["items"].as_array().unwrap().len(), 2);
    assert_eq!(order["items"][0]["lineTotal"], "40.00");
    assert_eq!(order["billingAddress"], order["shippingAddress"]);

    let uri = format!("/orders/{}", order["id"].as_str().unwrap());
    let (status, fetched) = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["contact"], order["contact"]);
    assert_eq!(fetched["shippingAddress"], order["shippingAddress"]);
    assert_eq!(fetched["paymentMethod"], "credit_card");
    assert_eq!(fetched["total"], "73.85");
    assert_eq!(fetched["customer"]["name"], "Ada Lovelace");
    assert_eq!(fetched["customer"]["id"], Value::Null);
}

#[tokio::test]
async fn test_client_totals_are_not_trusted() {
    let app = app();
    let mut body = draft();
    body["orderData"]["clientTotals"] = json!({ "subtotal": "1.00", "shipping": "0.00", "tax": "0.00", "total": "1.00" });
    let (status, order) = app.send(Method::POST, "/orders", None, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["total"], "73.85");
}

#[tokio::test]
async fn test_empty_order_is_rejected() {
    let app = app();
    let mut body = draft();
    body["orderItems"] = json!([]);
    let (status, error) = app.send(Method::POST, "/orders", None, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "validation_failed");
    assert!(error["fields"]["orderItems"].is_array());
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn test_field_level_validation() {
    let app = app();
    let mut body = draft();
    body["orderData"]["contact"]["email"] = json!("not-an-email");
    let (status, error) = app.send(Method::POST, "/orders", None, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["fields"]["orderData.contact.email"].is_array());
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn test_oversized_prices_are_rejected() {
    let app = app();
    for price in ["79228162514264337593543950335", "100000000000.00"] {
        let mut body = draft();
        body["orderItems"][0]["unitPrice"] = json!(price);
        let (status, error) = app.send(Method::POST, "/orders", None, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{price}: {error}");
        assert_eq!(error["retryable"], false);
        assert!(error["fields"]["orderItems[0].unitPrice"].is_array());
    }
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn test_changed_draft_under_same_key_conflicts() {
    let app = app();
    let key = Uuid::new_v4();
    let (status, _) = app.send_with(Method::POST, "/orders", None, Some(draft()), Some(key)).await;
    assert_eq!(status, StatusCode::CREATED);

    let mut edited = draft();
    edited["orderData"]["shippingAddress"]["city"] = json!("Chicago");
    edited["orderItems"].as_array_mut().unwrap().pop();
    let (status, error) = app.send_with(Method::POST, "/orders", None, Some(edited), Some(key)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "idempotency_conflict");
    assert_eq!(app.store.order_count().await, 1);
}

#[tokio::test]
async fn test_unknown_fields_are_rejected() {
    let app = app();
    let mut body = draft();
    body["orderData"]["total"] = json!("0.01");
    let (status, error) = app.send(Method::POST, "/orders", None, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "malformed_request");
}

#[tokio::test]
async fn test_storage_failure_is_retryable_and_leaves_nothing() {
    let app = app();
    app.store.fail_item_insert_at(1);
    let (status, error) = app.send(Method::POST, "/orders", None, Some(draft())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error["retryable"], true);
    assert_eq!(app.store.order_count().await, 0);

    app.store.clear_faults();
    app.place(None).await;
    assert_eq!(app.store.order_count().await, 1);
}

#[tokio::test]
async fn test_idempotency_key_replays_the_first_order() {
    let app = app();
    let key = Uuid::new_v4();
    let (first_status, first) = app.send_with(Method::POST, "/orders", Some(ALICE), Some(draft()), Some(key)).await;
    let (second_status, second) = app.send_with(Method::POST, "/orders", Some(ALICE), Some(draft()), Some(key)).await;
    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first["id"], second["id"]);
    assert_eq!(app.store.order_count().await, 1);

    let (status, _) = app.send_with(Method::POST, "/orders", Some(BOB), Some(draft()), Some(key)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_order_ownership() {
    let app = app();
    let order = app.place(Some(ALICE)).await;
    assert_eq!(order["ownerId"], app.alice.to_string());
    let uri = format!("/orders/{}", order["id"].as_str().unwrap());

    assert_eq!(app.send(Method::GET, &uri, Some(ALICE), None).await.0, StatusCode::OK);
    assert_eq!(app.send(Method::GET, &uri, Some(ADMIN), None).await.0, StatusCode::OK);
    assert_eq!(app.send(Method::GET, &uri, Some(BOB), None).await.0, StatusCode::FORBIDDEN);
    assert_eq!(app.send(Method::GET, &uri, None, None).await.0, StatusCode::UNAUTHORIZED);

    let tracking = format!("{uri}/tracking");
    assert_eq!(app.send(Method::GET, &tracking, Some(BOB), None).await.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_order_and_bad_token() {
    let app = app();
    let uri = format!("/orders/{}", Uuid::new_v4());
    let (status, error) = app.send(Method::GET, &uri, Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"], "order_not_found");

    let (status, _) = app.send(Method::GET, &uri, Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(Method::GET, "/orders/not-a-uuid", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_status_progression() {
    let app = app();
    let order = app.place(None).await;
    let id = order["id"].as_str().unwrap();
    let uri = format!("/orders/{id}/status");
    let eta = (chrono::Utc::now() + chrono::Duration::days(5)).date_naive().to_string();

    let (status, updated) =
        app.send(Method::PUT, &uri, Some(ADMIN), Some(json!({ "status": "out_for_delivery", "expectedDeliveryDate": eta }))).await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["status"], "out_for_delivery");
    assert_eq!(updated["expectedDeliveryDate"], eta);
    assert_eq!(updated["createdAt"], order["createdAt"]);

    let (status, tracking) = app.send(Method::GET, &format!("/orders/{id}/tracking"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tracking["progress"]["kind"], "in_progress");
    assert_eq!(tracking["progress"]["currentIndex"], 2);

    let (status, _) = app.send(Method::PUT, &uri, Some(ADMIN), Some(json!({ "status": "cancelled" }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, error) = app.send(Method::PUT, &uri, Some(ADMIN), Some(json!({ "status": "processing" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "invalid_transition");

    let (_, fetched) = app.send(Method::GET, &format!("/orders/{id}"), None, None).await;
    assert_eq!(fetched["status"], "cancelled");
    assert_eq!(fetched["expectedDeliveryDate"], eta);

    let (_, tracking) = app.send(Method::GET, &format!("/orders/{id}/tracking"), None, None).await;
    assert_eq!(tracking["progress"]["kind"], "cancelled");
}

#[tokio::test]
async fn test_status_update_is_admin_only() {
    let app = app();
    let order = app.place(Some(ALICE)).await;
    let uri = format!("/orders/{}/status", order["id"].as_str().unwrap());
    let body = json!({ "status": "processing" });
    assert_eq!(app.send(Method::PUT, &uri, Some(ALICE), Some(body.clone())).await.0, StatusCode::FORBIDDEN);
    assert_eq!(app.send(Method::PUT, &uri, None, Some(body.clone())).await.0, StatusCode::UNAUTHORIZED);

    let missing = format!("/orders/{}/status", Uuid::new_v4());
    assert_eq!(app.send(Method::PUT, &missing, Some(ADMIN), Some(body)).await.0, StatusCode::NOT_FOUND);
    assert_eq!(app.send(Method::PUT, &uri, Some(ADMIN), Some(json!({ "status": "shipped" }))).await.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_listings_are_scoped() {
    let app = app();
    app.place(Some(ALICE)).await;
    app.place(Some(ALICE)).await;
    app.place(Some(BOB)).await;
    app.place(None).await;

    let (status, page) = app.send(Method::GET, "/orders?limit=2", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 4);
    assert_eq!(page["limit"], 2);
    assert_eq!(page["totalPages"], 2);
    assert_eq!(page["orders"].as_array().unwrap().len(), 2);

    let (_, page) = app.send(Method::GET, &format!("/orders?customerId={}", app.alice), Some(ADMIN), None).await;
    assert_eq!(page["total"], 2);

    let (_, page) = app.send(Method::GET, "/orders?status=delivered", Some(ADMIN), None).await;
    assert_eq!(page["total"], 0);

    assert_eq!(app.send(Method::GET, "/orders", Some(ALICE), None).await.0, StatusCode::FORBIDDEN);
    assert_eq!(app.send(Method::GET, "/orders", None, None).await.0, StatusCode::UNAUTHORIZED);

    let override_uri = format!("/customer/orders?customerId={}", Uuid::new_v4());
    let (status, page) = app.send(Method::GET, &override_uri, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    let alice = app.alice.to_string();
    assert!(page["orders"].as_array().unwrap().iter().all(|o| o["ownerId"] == alice.as_str()));

    assert_eq!(app.send(Method::GET, "/customer/orders", None, None).await.0, StatusCode::UNAUTHORIZED);
}
