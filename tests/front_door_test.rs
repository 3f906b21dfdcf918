//! HTTP front door tests.
//!
//! Drive the router in-process with `tower::ServiceExt::oneshot` against an
//! in-memory store and a scripted delivery client, so no sockets or push
//! services are involved.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use push_dispatch::notifications::{
    DeliveryClient, DeliveryError, MemorySubscriptionStore, VapidIdentity, VapidKeys,
};
use push_dispatch::server::{router, AppState};
use push_dispatch::{Dispatcher, Subscription, SubscriptionStore};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

/// Delivery double: endpoints listed in `statuses` fail with that status,
/// everything else is accepted.
#[derive(Default)]
struct FakeDelivery {
    statuses: HashMap<String, u16>,
    calls: AtomicUsize,
}

#[async_trait]
impl DeliveryClient for FakeDelivery {
    async fn deliver(
        &self,
        _vapid: &VapidIdentity,
        subscription: &Subscription,
        _payload: &[u8],
    ) -> Result<(), DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.statuses.get(&subscription.endpoint) {
            Some(&status) => push_dispatch::notifications::push::classify_status(status, ""),
            None => Ok(()),
        }
    }
}

fn identity() -> VapidIdentity {
    let keys = VapidKeys::generate();
    VapidIdentity::new(
        "mailto:coach@example.com",
        keys.public_key_base64url(),
        keys.private_key_base64url(),
    )
    .unwrap()
}

fn sub(owner: Option<&str>, endpoint: &str) -> Subscription {
    Subscription::new(owner.map(String::from), endpoint, "p256dh", "auth")
}

struct Harness {
    app: Router,
    store: Arc<MemorySubscriptionStore>,
    delivery: Arc<FakeDelivery>,
}

fn harness(
    subscriptions: Vec<Subscription>,
    delivery: FakeDelivery,
    vapid: Option<VapidIdentity>,
) -> Harness {
    let store = Arc::new(MemorySubscriptionStore::with_subscriptions(subscriptions));
    let delivery = Arc::new(delivery);
    let dispatcher = Dispatcher::new(
        Arc::clone(&store) as Arc<dyn SubscriptionStore>,
        Arc::clone(&delivery) as Arc<dyn DeliveryClient>,
        vapid,
    );
    Harness {
        app: router(Arc::new(AppState { dispatcher })),
        store,
        delivery,
    }
}

fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_send_reports_counts() {
    let mut delivery = FakeDelivery::default();
    delivery
        .statuses
        .insert("https://push.example.com/b".to_string(), 500);
    let h = harness(
        vec![
            sub(Some("u1"), "https://push.example.com/a"),
            sub(Some("u2"), "https://push.example.com/b"),
        ],
        delivery,
        Some(identity()),
    );

    let (status, body) = call(
        h.app,
        json_request(
            Method::POST,
            "/send-push-notification",
            &json!({"title": "Hora do treino", "body": "Seu treino começa em 10 minutos"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"message": "Notifications processed", "sent": 1, "failed": 1, "total": 2})
    );
}

#[tokio::test]
async fn test_send_scoped_to_user() {
    let h = harness(
        vec![
            sub(Some("u1"), "https://push.example.com/a"),
            sub(Some("u1"), "https://push.example.com/b"),
            sub(Some("u2"), "https://push.example.com/c"),
        ],
        FakeDelivery::default(),
        Some(identity()),
    );

    let (status, body) = call(
        h.app,
        json_request(
            Method::POST,
            "/send-push-notification",
            &json!({"title": "t", "body": "b", "userId": "u1"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(h.delivery.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_send_with_no_subscriptions() {
    let h = harness(vec![], FakeDelivery::default(), Some(identity()));

    let (status, body) = call(
        h.app,
        json_request(
            Method::POST,
            "/send-push-notification",
            &json!({"title": "t", "body": "b", "userId": "nobody"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "No subscriptions found", "sent": 0}));
}

#[tokio::test]
async fn test_send_without_title_is_bad_request() {
    let h = harness(
        vec![sub(None, "https://push.example.com/a")],
        FakeDelivery::default(),
        Some(identity()),
    );

    let (status, body) = call(
        h.app,
        json_request(Method::POST, "/send-push-notification", &json!({"body": "b"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("title"));
    assert_eq!(h.delivery.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_send_null_title_is_bad_request() {
    let h = harness(
        vec![sub(None, "https://push.example.com/a")],
        FakeDelivery::default(),
        Some(identity()),
    );

    let (status, body) = call(
        h.app,
        json_request(
            Method::POST,
            "/send-push-notification",
            &json!({"title": null, "body": "x"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("title"));
    assert_eq!(h.delivery.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_send_oversized_notification_is_bad_request() {
    let h = harness(
        vec![sub(None, "https://push.example.com/a")],
        FakeDelivery::default(),
        Some(identity()),
    );

    let (status, _) = call(
        h.app,
        json_request(
            Method::POST,
            "/send-push-notification",
            &json!({"title": "t", "body": "x".repeat(5000)}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.delivery.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_send_malformed_json_is_bad_request() {
    let h = harness(vec![], FakeDelivery::default(), Some(identity()));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/send-push-notification")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = call(h.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_send_without_vapid_is_server_error() {
    let h = harness(
        vec![sub(None, "https://push.example.com/a")],
        FakeDelivery::default(),
        None,
    );

    let (status, body) = call(
        h.app,
        json_request(
            Method::POST,
            "/send-push-notification",
            &json!({"title": "t", "body": "b"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("VAPID"));
    assert_eq!(h.delivery.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.len().await, 1);
}

#[tokio::test]
async fn test_send_prunes_gone_endpoints() {
    let mut delivery = FakeDelivery::default();
    delivery
        .statuses
        .insert("https://push.example.com/old".to_string(), 410);
    let h = harness(
        vec![
            sub(None, "https://push.example.com/old"),
            sub(None, "https://push.example.com/new"),
        ],
        delivery,
        Some(identity()),
    );

    let (status, body) = call(
        h.app,
        json_request(
            Method::POST,
            "/send-push-notification",
            &json!({"title": "t", "body": "b"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["failed"], 1);
    assert!(!h.store.contains("https://push.example.com/old").await);
    assert!(h.store.contains("https://push.example.com/new").await);
}

#[tokio::test]
async fn test_preflight_allows_any_origin() {
    let h = harness(vec![], FakeDelivery::default(), None);

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/send-push-notification")
        .header(header::ORIGIN, "https://app.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type, apikey")
        .body(Body::empty())
        .unwrap();
    let response = h.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
        .to_str()
        .unwrap()
        .to_string();
    for name in ["authorization", "x-client-info", "apikey", "content-type"] {
        assert!(allowed.contains(name), "{name} missing from {allowed}");
    }
}

#[tokio::test]
async fn test_responses_carry_cors_header() {
    let h = harness(vec![], FakeDelivery::default(), Some(identity()));

    let mut request = json_request(
        Method::POST,
        "/send-push-notification",
        &json!({"title": "", "body": "b"}),
    );
    request.headers_mut().insert(
        header::ORIGIN,
        "https://app.example.com".parse().unwrap(),
    );
    let response = h.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn test_register_and_remove_subscription() {
    let h = harness(vec![], FakeDelivery::default(), Some(identity()));
    let endpoint = "https://fcm.googleapis.com/fcm/send/abc";

    let (status, _) = call(
        h.app.clone(),
        json_request(
            Method::POST,
            "/push-subscriptions",
            &json!({
                "userId": "u1",
                "endpoint": endpoint,
                "keys": {"p256dh": "BPk", "auth": "c2VjcmV0"}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(h.store.list_by_owner("u1").await.unwrap().len(), 1);

    let (status, body) = call(
        h.app.clone(),
        json_request(
            Method::DELETE,
            "/push-subscriptions",
            &json!({"endpoint": endpoint}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], true);
    assert!(h.store.is_empty().await);

    let (status, body) = call(
        h.app,
        json_request(
            Method::DELETE,
            "/push-subscriptions",
            &json!({"endpoint": endpoint}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], false);
}

#[tokio::test]
async fn test_register_requires_keys() {
    let h = harness(vec![], FakeDelivery::default(), Some(identity()));

    let (status, body) = call(
        h.app,
        json_request(
            Method::POST,
            "/push-subscriptions",
            &json!({
                "endpoint": "https://push.example.com/a",
                "keys": {"p256dh": "BPk", "auth": ""}
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "keys.auth is required");
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_vapid_public_key_route() {
    let identity = identity();
    let expected = identity.keys().public_key_base64url().to_string();
    let h = harness(vec![], FakeDelivery::default(), Some(identity));

    let request = Request::builder()
        .uri("/vapid-public-key")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(h.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["publicKey"], expected);
}

#[tokio::test]
async fn test_vapid_public_key_unconfigured() {
    let h = harness(vec![], FakeDelivery::default(), None);

    let request = Request::builder()
        .uri("/vapid-public-key")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(h.app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_health() {
    let h = harness(vec![], FakeDelivery::default(), None);

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = call(h.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}
