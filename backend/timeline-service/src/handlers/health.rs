use actix_web::{web, HttpResponse};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;
use tracing::warn;

use super::TimelineHandlerState;

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
enum ComponentStatus {
    Healthy,
    Degraded,
}

#[derive(Serialize)]
struct ComponentCheck {
    status: ComponentStatus,
    message: String,
    latency_ms: u64,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    status: ComponentStatus,
    checks: HashMap<&'static str, ComponentCheck>,
    timestamp: String,
}

/// Readiness with a cache round-trip.
///
/// The cache is optional: timelines are assembled directly while it is down, so a
/// failed ping reports `degraded` but keeps the instance ready.
pub async fn readiness_check(state: web::Data<TimelineHandlerState>) -> HttpResponse {
    let start = Instant::now();
    let cache = match state.service.cache().ping().await {
        Ok(()) => ComponentCheck {
            status: ComponentStatus::Healthy,
            message: "Timeline cache reachable".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        },
        Err(e) => {
            warn!(error = %e, "Timeline cache ping failed");
            ComponentCheck {
                status: ComponentStatus::Degraded,
                message: format!("Timeline cache unreachable: {}", e),
                latency_ms: start.elapsed().as_millis() as u64,
            }
        }
    };

    let status = cache.status;
    let mut checks = HashMap::new();
    checks.insert("cache", cache);

    HttpResponse::Ok().json(ReadinessResponse {
        ready: true,
        status,
        checks,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
