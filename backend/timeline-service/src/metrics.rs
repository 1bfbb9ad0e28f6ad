//! Timeline service metrics
//!
//! Registered in the default Prometheus registry and exposed on `/metrics`.

use actix_web::{HttpResponse, Responder};
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};

static TIMELINE_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "timeline_requests_total",
        "Timeline pages served, by source (cache/assembled)",
        &["source"]
    )
    .expect("Failed to register timeline requests metric")
});

pub static ASSEMBLY_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "timeline_assembly_duration_seconds",
        "Time spent assembling a timeline page",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register timeline assembly duration metric")
});

pub static INVALIDATED_VIEWERS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "timeline_invalidated_viewers_total",
        "Viewer timelines invalidated after a post was published"
    )
    .expect("Failed to register timeline invalidation metric")
});

static INVALIDATIONS_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "timeline_invalidations_dropped_total",
        "Publish notifications dropped because the invalidation queue was full or closed"
    )
    .expect("Failed to register dropped invalidation metric")
});

/// Record where a served page came from
pub fn record_request(source: &str) {
    TIMELINE_REQUESTS_TOTAL.with_label_values(&[source]).inc();
}

pub fn record_dropped_invalidation() {
    INVALIDATIONS_DROPPED.inc();
}

/// Handler that serialises Prometheus metrics in text format.
pub async fn metrics_handler() -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => HttpResponse::Ok()
            .content_type(encoder.format_type())
            .body(buffer),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}
