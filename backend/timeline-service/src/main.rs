use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::io;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timeline_cache::{CacheMetrics, CacheStore, InMemoryCacheStore, RedisCacheStore};
use timeline_service::config::Config;
use timeline_service::handlers::{self, TimelineHandlerState};
use timeline_service::middleware::JwtValidator;
use timeline_service::repository::PostgresTimelineRepository;
use timeline_service::services::TimelineService;

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(true),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration loading failed: {:#}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting timeline-service v{}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.env);

    let validator = match JwtValidator::from_rsa_pem(&config.auth.jwt_public_key_pem) {
        Ok(v) => Arc::new(v),
        Err(e) => {
            tracing::error!("Failed to initialize JWT validation: {:#}", e);
            eprintln!("ERROR: Failed to initialize JWT validation: {}", e);
            std::process::exit(1);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("Database connection failed: {e}")))?;
    let repository = Arc::new(PostgresTimelineRepository::new(pool));
    if let Err(e) = repository.health_check().await {
        warn!("Database health check failed: {:#}", e);
    }

    if let Err(e) = CacheMetrics::register(prometheus::default_registry()) {
        warn!("Failed to register cache metrics: {}", e);
    }

    let store: Arc<dyn CacheStore> = match RedisCacheStore::connect(&config.redis.url).await {
        Ok(store) => {
            info!("Connected to Redis timeline cache");
            Arc::new(store)
        }
        Err(e) => {
            warn!(
                "Redis unavailable ({}), using in-process timeline cache",
                e
            );
            Arc::new(InMemoryCacheStore::new())
        }
    };

    let service = Arc::new(TimelineService::new(
        repository.clone(),
        repository.clone(),
        repository,
        store,
        config.timeline.clone(),
    ));

    let state = web::Data::new(TimelineHandlerState {
        service,
        internal_api_token: config.auth.internal_api_token.clone(),
    });

    let bind_addr = (config.app.host.clone(), config.app.port);
    info!("HTTP server listening on {}:{}", bind_addr.0, bind_addr.1);

    HttpServer::new(move || {
        let validator = validator.clone();
        App::new()
            .wrap(TracingLogger::default())
            .app_data(state.clone())
            .configure(|cfg| handlers::configure(cfg, validator))
    })
    .bind(bind_addr)?
    .run()
    .await
}
