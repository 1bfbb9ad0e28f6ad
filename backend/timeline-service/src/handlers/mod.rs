pub mod health;
pub mod timeline;

pub use health::readiness_check;
pub use timeline::{get_timeline, post_published, refresh_timeline, TimelineHandlerState};

use crate::metrics::metrics_handler;
use crate::middleware::{JwtAuthMiddleware, JwtValidator};
use actix_web::web;
use std::sync::Arc;

/// Register every HTTP route of the service
pub fn configure(cfg: &mut web::ServiceConfig, validator: Arc<JwtValidator>) {
    cfg.route("/health", web::get().to(|| async { "OK" }))
        .route("/health/ready", web::get().to(readiness_check))
        .route("/metrics", web::get().to(metrics_handler))
        .service(web::scope("/internal/v1/timeline").service(post_published))
        .service(
            web::scope("/api/v1/timeline")
                .wrap(JwtAuthMiddleware::new(validator))
                .service(get_timeline)
                .service(refresh_timeline),
        );
}
