//! Axum application setup
//!
//! Creates and configures the Axum application with routes and middleware.

use crate::{config::Settings, service::ResolverService};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Resolve service owning the gate, caches and credentials
    pub service: Arc<ResolverService>,
    /// Application settings
    pub settings: Arc<Settings>,
    /// Server start time for uptime calculation
    pub start_time: std::time::Instant,
}

/// Create the main Axum application with routes and middleware
pub fn create_app(service: Arc<ResolverService>) -> Router {
    let settings = Arc::new(service.settings().clone());
    let cors = if settings.server.enable_cors {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    let state = AppState {
        service,
        settings,
        start_time: std::time::Instant::now(),
    };

    Router::new()
        .route("/api/formats/{video_id}", get(super::handlers::formats))
        .route("/api/redirect/{video_id}", get(super::handlers::redirect))
        .route("/api/best/{video_id}", get(super::handlers::best))
        .route("/ping", get(super::handlers::ping))
        .route("/health", get(super::handlers::health))
        .route(
            "/invalidate_caches",
            post(super::handlers::invalidate_caches),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        let service = ResolverService::new(Settings::default()).unwrap();
        create_app(Arc::new(service))
    }

    #[tokio::test]
    async fn test_ping_route() {
        let response = app()
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_id_rejected_before_work() {
        let response = app()
            .oneshot(
                Request::get("/api/formats/not-an-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let response = app()
            .oneshot(Request::get("/get_pot").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
