use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::middleware::jwt_auth::UserId;
use crate::services::TimelineService;

/// Header carrying the shared token on internal routes
pub const INTERNAL_TOKEN_HEADER: &str = "X-Internal-Token";

#[derive(Debug, Deserialize)]
pub struct TimelineQueryParams {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

pub struct TimelineHandlerState {
    pub service: Arc<TimelineService>,
    pub internal_api_token: String,
}

#[get("")]
pub async fn get_timeline(
    user: UserId,
    query: web::Query<TimelineQueryParams>,
    state: web::Data<TimelineHandlerState>,
) -> Result<HttpResponse> {
    debug!(viewer_id = %user.0, limit = ?query.limit, "Timeline request");

    let page = state
        .service
        .get_timeline(user.0, query.limit, query.cursor.as_deref())
        .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[post("/refresh")]
pub async fn refresh_timeline(
    user: UserId,
    state: web::Data<TimelineHandlerState>,
) -> Result<HttpResponse> {
    let page = state.service.refresh_timeline(user.0).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[post("/posts/{post_id}/published")]
pub async fn post_published(
    req: HttpRequest,
    path: web::Path<Uuid>,
    state: web::Data<TimelineHandlerState>,
) -> Result<HttpResponse> {
    let authorized = req
        .headers()
        .get(INTERNAL_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .map_or(false, |supplied| {
            !supplied.is_empty() && tokens_match(supplied, &state.internal_api_token)
        });

    if !authorized {
        warn!(path = %req.path(), "Rejected internal call with missing or wrong token");
        return Err(AppError::Unauthorized("invalid internal token".to_string()));
    }

    let post_id = path.into_inner();
    let queued = state.service.post_published(post_id).await?;

    Ok(HttpResponse::Accepted().json(serde_json::json!({
        "postId": post_id,
        "queued": queued,
    })))
}

/// Compare tokens in time independent of where they differ
fn tokens_match(supplied: &str, expected: &str) -> bool {
    let (a, b) = (supplied.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
