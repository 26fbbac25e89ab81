pub mod request_id;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use request_id::{request_id_middleware, RequestId, X_REQUEST_ID};

use crate::controllers::{health, podcast::PodcastController};
use crate::infrastructure::config::Config;
use crate::infrastructure::repositories::JobRepository;

/// All routes with request-id and tracing layers applied
pub fn build_router(
    job_repo: Arc<dyn JobRepository>,
    podcast_controller: Arc<PodcastController>,
) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::health_ready))
        .with_state(job_repo);

    let podcast_routes = Router::new()
        .route("/api/podcasts", post(PodcastController::create_podcast))
        .route("/api/podcasts/:job_id", get(PodcastController::get_podcast))
        .route(
            "/api/podcasts/:job_id/events",
            get(PodcastController::list_events),
        )
        .route(
            "/api/podcasts/:job_id/cancel",
            post(PodcastController::cancel_podcast),
        )
        .with_state(podcast_controller);

    Router::new()
        .merge(health_routes)
        .merge(podcast_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_id_middleware)),
        )
}

/// Serve until `shutdown` is cancelled
pub async fn start_http_server(
    config: Arc<Config>,
    job_repo: Arc<dyn JobRepository>,
    podcast_controller: Arc<PodcastController>,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(job_repo, podcast_controller);

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;

    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
