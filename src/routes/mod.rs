pub mod ask;
pub mod health;
pub mod media;

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::metrics;
use crate::services::AppState;

/// Maximum concurrent requests (backpressure control)
const MAX_CONCURRENT_REQUESTS: usize = 100;

/// Request timeout in seconds; generous because one ask can chain
/// several model round trips plus an image generation.
const REQUEST_TIMEOUT_SECS: u64 = 90;

pub fn create_router(state: AppState) -> Router {
    let (prometheus_layer, metrics_router) = metrics::setup_metrics();

    let api_routes = Router::new()
        .route("/ask", post(ask::ask))
        .route("/generate_image", post(media::generate_image))
        .route("/tts", post(media::tts))
        .with_state(state);

    Router::new()
        .merge(api_routes)
        .route("/health", get(health::health_check))
        .merge(metrics_router)
        .layer(
            ServiceBuilder::new()
                // Prometheus metrics (outermost - captures all requests)
                .layer(prometheus_layer)
                .layer(TraceLayer::new_for_http())
                // Request timeout
                .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
                // Concurrency limit for backpressure
                .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS)),
        )
}
