//! MentorHub API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Authentication (bearer JWT) and role resolution
//! - Rate limiting
//! - Request routing to the availability, booking and payment services
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    extract::{FromRef, Request},
    http::HeaderValue,
    middleware::{from_fn, Next},
    routing::{delete, get, patch, post},
    Router,
};
use mentorhub_common::{
    auth::JwtManager,
    booking::SessionLifecycle,
    clock::{Clock, SystemClock},
    config::{AppConfig, ObservabilityConfig, ServerConfig},
    db::{DbPool, Repository},
    metrics::{self, GATEWAY_BUCKETS, LATENCY_BUCKETS, METRICS_PREFIX},
    payments::{create_gateway, PaymentOrchestrator},
    scheduling::{AvailabilityService, SlotValidator},
    sweeper::ExpirySweeper,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use handlers::{availability, health, payments, sessions};
use middleware::rate_limit::{create_rate_limiter, rate_limit_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repo: Repository,
    pub jwt: Arc<JwtManager>,
    pub availability: Arc<AvailabilityService>,
    pub sessions: Arc<SessionLifecycle>,
    pub payments: Arc<PaymentOrchestrator>,
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.observability);

    info!("Starting MentorHub API Gateway v{}", mentorhub_common::VERSION);

    install_metrics_exporter(&config.observability)?;
    metrics::register_metrics();

    let jwt_secret = config
        .auth
        .jwt_secret
        .as_deref()
        .context("auth.jwt_secret must be set")?;
    let jwt = Arc::new(JwtManager::new(jwt_secret, config.auth.jwt_leeway_secs));

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        db.migrate().await?;
    }
    let repo = Repository::new(db);

    let gateway = create_gateway(&config.payments.gateway)?;
    info!(
        provider = gateway.provider(),
        default_mode = config.payments.mode.as_str(),
        "Payment gateway ready"
    );

    // Wire services over the shared repository
    let store = Arc::new(repo.clone());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sweeper = ExpirySweeper::new(store.clone(), clock.clone());

    let availability = Arc::new(AvailabilityService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        clock.clone(),
        config.scheduling.clone(),
    ));
    let lifecycle = Arc::new(SessionLifecycle::new(
        store.clone(),
        store.clone(),
        SlotValidator::new(store.clone()),
        sweeper.clone(),
        store.clone(),
        clock.clone(),
        config.scheduling.clone(),
        config.payments.clone(),
    ));
    let payment_orchestrator = Arc::new(PaymentOrchestrator::new(
        lifecycle.clone(),
        store.clone(),
        gateway,
        store.clone(),
        store.clone(),
        sweeper,
        clock,
        config.payments.clone(),
    ));

    let config = Arc::new(config);
    let state = AppState {
        config: config.clone(),
        repo,
        jwt,
        availability,
        sessions: lifecycle,
        payments: payment_orchestrator,
    };

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

fn install_metrics_exporter(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], config.metrics_port)))
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_gateway_duration_seconds", METRICS_PREFIX)),
            GATEWAY_BUCKETS,
        )?
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(port = config.metrics_port, "Prometheus exporter listening");
    Ok(())
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))

        // Availability endpoints
        .route("/availability", post(availability::create_rule))
        .route("/availability/block-date", post(availability::block_date))
        .route("/availability/block-date/{date}", delete(availability::unblock_date))
        .route("/availability/mentor/{id}", get(availability::mentor_availability))
        .route(
            "/availability/{id}",
            patch(availability::update_rule).delete(availability::delete_rule),
        )

        // Booking and payment endpoints
        .route("/sessions/book", post(sessions::book))
        .route("/sessions/create-order", post(sessions::book))
        .route("/sessions/verify-payment", post(payments::verify_payment))
        .route("/sessions/{id}/manual-payment", post(payments::submit_manual_proof))
        .route("/sessions/admin/manual-payments", get(payments::pending_manual_payments))
        .route(
            "/sessions/admin/manual-payments/{id}/review",
            patch(payments::review_manual_payment),
        )

        // Lifecycle endpoints
        .route("/sessions/{id}/approve", patch(sessions::approve))
        .route("/sessions/{id}/reject", patch(sessions::reject))
        .route("/sessions/{id}/cancel", patch(sessions::cancel))
        .route("/sessions/{id}/reschedule", patch(sessions::reschedule))
        .route("/sessions/{id}/meeting-link", patch(sessions::meeting_link))
        .route("/sessions/{id}/complete", patch(sessions::complete))

        // Listings
        .route("/sessions/student/me", get(sessions::student_sessions))
        .route("/sessions/mentor/me", get(sessions::mentor_sessions));

    let mut app = Router::new()
        .nest("/v1", api_routes)
        .layer(from_fn(middleware::track_metrics));

    if config.rate_limit.enabled {
        let limit = config.rate_limit.requests_per_second;
        let limiter = create_rate_limiter(limit, config.rate_limit.burst);
        app = app.layer(from_fn(move |request: Request, next: Next| {
            let limiter = limiter.clone();
            async move { rate_limit_middleware(request, next, limiter, limit).await }
        }));
    }

    app.layer(TimeoutLayer::new(config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.server))
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
