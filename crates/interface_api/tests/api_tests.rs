//! Router tests over in-memory ports
//!
//! Each test drives the real router with `tower::ServiceExt::oneshot`,
//! so auth middleware, extractors, and error mapping are all exercised.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use core_kernel::{BookingId, CachedSettings, Currency, InMemorySettings, Money, TripId, UserId};
use domain_cancellation::{CancellationEngine, InMemoryCancellationLedger};
use domain_payment::{
    AuthorizationService, BookingSnapshot, InMemoryAuthorizationStore, InMemoryEventLog,
    NotificationOutbox, PaymentAuthorization, StaticBookingPort,
};
use domain_scheduler::InMemoryJobStore;
use infra_gateway::MockGateway;
use interface_api::auth::create_token;
use interface_api::config::ApiConfig;
use interface_api::{create_router, AppState};

const SECRET: &str = "test-secret";

struct Harness {
    app: axum::Router,
    service: Arc<AuthorizationService<InMemoryAuthorizationStore, InMemoryJobStore>>,
    booking: Arc<StaticBookingPort>,
    sender_id: UserId,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryAuthorizationStore::new());
    let jobs = Arc::new(InMemoryJobStore::new());
    let gateway = Arc::new(MockGateway::new());
    let booking = Arc::new(StaticBookingPort::new());
    let event_log = Arc::new(InMemoryEventLog::new());
    let outbox = Arc::new(NotificationOutbox::new());
    let settings = Arc::new(CachedSettings::new(
        InMemorySettings::new(),
        Duration::from_secs(60),
    ));
    let ledger = Arc::new(InMemoryCancellationLedger::new());

    let service = Arc::new(AuthorizationService::new(
        Arc::clone(&store),
        Arc::clone(&jobs),
        gateway.clone(),
        booking.clone(),
        event_log.clone(),
        Arc::clone(&outbox),
        settings.clone(),
    ));
    let cancellations = Arc::new(CancellationEngine::new(
        Arc::clone(&store),
        Arc::clone(&jobs),
        gateway,
        booking.clone(),
        event_log,
        outbox,
        ledger,
        settings,
    ));

    let sender_id = UserId::new();
    let config = ApiConfig {
        jwt_secret: SECRET.to_string(),
        ..ApiConfig::default()
    };
    let state = AppState {
        service: Arc::clone(&service),
        cancellations,
        jobs,
        config,
    };

    Harness {
        app: create_router(state),
        service,
        booking,
        sender_id,
    }
}

impl Harness {
    async fn seed_authorization(&self) -> PaymentAuthorization {
        let booking_id = BookingId::new();
        self.booking.register(BookingSnapshot {
            booking_id,
            trip_id: TripId::new(),
            sender_id: self.sender_id,
            traveler_id: UserId::new(),
            amount: Money::from_minor(10_000, Currency::USD),
            departure_at: Utc::now() + chrono::Duration::hours(72),
            destination_account: Some("acct_test".to_string()),
            traveler_confirmed_bookings: 0,
        });
        self.service.create_authorization(booking_id).await.unwrap()
    }

    fn token(&self) -> String {
        create_token(&self.sender_id.to_string(), vec!["admin".to_string()], SECRET, 300).unwrap()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn get(&self, uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token()))
            .body(Body::empty())
            .unwrap()
    }

    fn post(&self, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token()))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let h = harness();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = h.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_api_requires_bearer_token() {
    let h = harness();
    let request = Request::builder()
        .uri("/api/v1/authorizations?status=pending")
        .body(Body::empty())
        .unwrap();
    let (status, _) = h.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_by_status_returns_seeded_authorization() {
    let h = harness();
    let auth = h.seed_authorization().await;

    let (status, body) = h.send(h.get("/api/v1/authorizations?status=pending")).await;
    assert_eq!(status, StatusCode::OK);
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], auth.id().as_uuid().to_string());
    assert_eq!(items[0]["amount_cents"], 10_000);

    let (status, body) = h.send(h.get("/api/v1/authorizations?status=captured")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_authorization_is_404() {
    let h = harness();
    let missing = uuid::Uuid::new_v4();
    let (status, body) = h
        .send(h.get(&format!("/api/v1/authorizations/{missing}/timeline")))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_capture_before_confirmation_conflicts() {
    let h = harness();
    let auth = h.seed_authorization().await;

    let (status, body) = h
        .send(h.post(
            &format!("/api/v1/authorizations/{}/capture", auth.id().as_uuid()),
            Value::Null,
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_cancel_returns_refund_split() {
    let h = harness();
    let auth = h.seed_authorization().await;

    let (status, body) = h
        .send(h.post(
            &format!("/api/v1/authorizations/{}/cancel", auth.id().as_uuid()),
            json!({ "actor": "sender", "reason": "plans changed" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bucket"], "free");
    assert_eq!(body["refund"]["cents"], 10_000);

    let (status, body) = h
        .send(h.get(&format!("/api/v1/authorizations/{}", auth.id().as_uuid())))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
}

#[tokio::test]
async fn test_cancel_with_blank_reason_is_unprocessable() {
    let h = harness();
    let auth = h.seed_authorization().await;

    let (status, body) = h
        .send(h.post(
            &format!("/api/v1/authorizations/{}/cancel", auth.id().as_uuid()),
            json!({ "actor": "sender", "reason": "" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_job_stats_reflect_scheduled_deadlines() {
    let h = harness();
    h.seed_authorization().await;

    let (status, body) = h.send(h.get("/api/v1/jobs/stats")).await;
    assert_eq!(status, StatusCode::OK);
    // Creation schedules the confirmation-window jobs
    assert!(body["pending"].as_u64().unwrap() >= 1);
}
