mod common;

use actix_web::dev::{Service, ServiceResponse};
use actix_web::{http::StatusCode, test, web, App};
use chrono::{Duration, Utc};
use common::{post, service, FailingCacheStore, InMemoryRepository};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::Value;
use std::sync::Arc;
use timeline_cache::{CacheStore, InMemoryCacheStore};
use timeline_service::handlers::{self, TimelineHandlerState};
use timeline_service::middleware::jwt_auth::Claims;
use timeline_service::middleware::JwtValidator;
use timeline_service::models::Visibility;
use uuid::Uuid;

const SECRET: &[u8] = b"timeline-http-secret";
const INTERNAL_TOKEN: &str = "internal-test-token";

fn bearer(user: Uuid) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user.to_string(),
        exp: now + 600,
        iat: now,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET),
    )
    .unwrap();
    format!("Bearer {}", token)
}

fn state(repo: &Arc<InMemoryRepository>) -> web::Data<TimelineHandlerState> {
    state_with_store(repo, Arc::new(InMemoryCacheStore::new()))
}

fn state_with_store(
    repo: &Arc<InMemoryRepository>,
    store: Arc<dyn CacheStore>,
) -> web::Data<TimelineHandlerState> {
    web::Data::new(TimelineHandlerState {
        service: Arc::new(service(repo, store)),
        internal_api_token: INTERNAL_TOKEN.to_string(),
    })
}

/// Status of a response, including errors raised by middleware
async fn status_of<S, R, B>(app: &S, req: R) -> StatusCode
where
    S: Service<R, Response = ServiceResponse<B>, Error = actix_web::Error>,
{
    match test::try_call_service(app, req).await {
        Ok(resp) => resp.status(),
        Err(err) => err.as_response_error().status_code(),
    }
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state.clone())
                .configure(|cfg| handlers::configure(cfg, Arc::new(JwtValidator::from_secret(SECRET)))),
        )
        .await
    };
}

#[actix_web::test]
async fn timeline_requires_bearer_token() {
    let repo = InMemoryRepository::new();
    let state = state(&repo);
    let app = app!(state);

    let req = test::TestRequest::get().uri("/api/v1/timeline").to_request();
    assert_eq!(status_of(&app, req).await, StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/api/v1/timeline")
        .insert_header(("Authorization", "Bearer not-a-jwt"))
        .to_request();
    assert_eq!(status_of(&app, req).await, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn timeline_returns_camel_case_page() {
    let repo = InMemoryRepository::new();
    let viewer = Uuid::new_v4();
    for i in 0..3 {
        repo.add_post(post(Uuid::new_v4(), Visibility::Public, Duration::hours(i)));
    }
    let state = state(&repo);
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/v1/timeline?limit=2")
        .insert_header(("Authorization", bearer(viewer)))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["posts"].as_array().unwrap().len(), 2);
    assert_eq!(body["hasMore"], true);
    assert!(body["nextCursor"].is_string());
    assert!(body["posts"][0]["score"].is_number());
    assert!(body["posts"][0]["authorId"].is_string());

    let cursor = body["nextCursor"].as_str().unwrap();
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/timeline?limit=2&cursor={}", cursor))
        .insert_header(("Authorization", bearer(viewer)))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["posts"].as_array().unwrap().len(), 1);
    assert_eq!(body["hasMore"], false);
    assert!(body["nextCursor"].is_null());
}

#[actix_web::test]
async fn refresh_returns_head_page() {
    let repo = InMemoryRepository::new();
    let viewer = Uuid::new_v4();
    let state = state(&repo);
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/timeline/refresh")
        .insert_header(("Authorization", bearer(viewer)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn publish_notification_checks_internal_token() {
    let repo = InMemoryRepository::new();
    let published = post(Uuid::new_v4(), Visibility::Public, Duration::zero());
    repo.add_post(published.clone());
    let state = state(&repo);
    let app = app!(state);

    let uri = format!("/internal/v1/timeline/posts/{}/published", published.id);

    let req = test::TestRequest::post().uri(&uri).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(("X-Internal-Token", INTERNAL_TOKEN))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(("X-Internal-Token", ""))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(("X-Internal-Token", "internal-test-tokeN"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri(&format!("/internal/v1/timeline/posts/{}/published", Uuid::new_v4()))
        .insert_header(("X-Internal-Token", INTERNAL_TOKEN))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn repository_outage_maps_to_503() {
    let repo = InMemoryRepository::new();
    repo.fail_posts(true);
    let state = state(&repo);
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/v1/timeline")
        .insert_header(("Authorization", bearer(Uuid::new_v4())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn health_and_metrics_are_public() {
    let repo = InMemoryRepository::new();
    let state = state(&repo);
    let app = app!(state);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn readiness_reports_cache_state() {
    let repo = InMemoryRepository::new();
    let state = state(&repo);
    let app = app!(state);

    let req = test::TestRequest::get().uri("/health/ready").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["ready"], true);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["cache"]["status"], "healthy");
}

#[actix_web::test]
async fn readiness_stays_ready_with_cache_down() {
    let repo = InMemoryRepository::new();
    let state = state_with_store(&repo, Arc::new(FailingCacheStore));
    let app = app!(state);

    let req = test::TestRequest::get().uri("/health/ready").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["ready"], true);
    assert_eq!(body["status"], "degraded");
    assert!(body["checks"]["cache"]["message"]
        .as_str()
        .unwrap()
        .contains("redis down"));
}
