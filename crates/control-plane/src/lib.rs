// PulseBoard Control Plane Library
// Decision: Shared library for binaries (API server, OpenAPI export) and router tests

use std::future::Future;
use std::sync::Arc;

use axum::extract::FromRef;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// API routes and types (shared for OpenAPI generation)
pub mod api;

// Session token verification
pub mod auth;

// Pub/sub broker
pub mod broker;

// Server configuration
pub mod config;

// Services layer
pub mod services;
pub use services::{IngestService, RealtimeService};

// OpenAPI spec generation
pub mod openapi;

use crate::auth::AuthState;
use crate::broker::Broker;
use crate::openapi::ApiDoc;
use pulseboard_worker::WorkerRuntime;

/// App state shared across routes
#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<IngestService>,
    pub realtime: Arc<RealtimeService>,
    pub auth: AuthState,
    /// "postgres" or "memory", reported by /health
    pub storage_kind: &'static str,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Assemble the full HTTP surface
///
/// Health and Swagger UI are never prefixed; ingest and realtime routes are
/// nested under `api_prefix` when one is set.
pub fn build_router(state: AppState, cors_origins: Vec<HeaderValue>, api_prefix: &str) -> Router {
    let health_state = api::health::HealthState {
        storage: state.storage_kind,
    };

    let api_routes = Router::new()
        .merge(api::ingest::routes(state.clone()))
        .merge(api::realtime::routes(state));

    let app = Router::new()
        .merge(api::health::routes(health_state))
        .merge(build_router_with_prefix(api_routes, api_prefix))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()));

    // Add CORS layer only if origins are configured
    let app = if !cors_origins.is_empty() {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::AUTHORIZATION,
                    header::ACCEPT,
                    header::ORIGIN,
                    header::CACHE_CONTROL,
                ])
                .allow_credentials(true),
        )
    } else {
        app
    };

    app.layer(TraceLayer::new_for_http())
}

/// Graceful-shutdown future for `axum::serve`
///
/// Once `signal` fires the broker is closed, which ends every WebSocket and
/// SSE stream so the HTTP drain can complete. The in-process worker runtime
/// is drained before this resolves.
pub async fn shutdown_on<F>(
    signal: F,
    broker: Arc<dyn Broker>,
    runtime: Option<Arc<WorkerRuntime>>,
) where
    F: Future<Output = ()>,
{
    signal.await;
    tracing::info!("Shutdown signal received, closing live streams");

    if let Err(e) = broker.close().await {
        tracing::error!(error = %e, "Failed to close broker");
    }
    if let Some(runtime) = runtime {
        if let Err(e) = runtime.shutdown().await {
            tracing::error!(error = %e, "Worker runtime did not stop cleanly");
        }
    }
}

/// Build router with optional API prefix (extracted for testing)
fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_routes() -> Router {
        Router::new().route("/events", get(|| async { "ok" }))
    }

    #[tokio::test]
    async fn test_api_prefix_empty() {
        let app = build_router_with_prefix(test_routes(), "");

        let response = app
            .oneshot(Request::builder().uri("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_api_prefix_set() {
        let app = build_router_with_prefix(test_routes(), "/api");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/events")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        // Route should NOT work without prefix
        let response = app
            .oneshot(Request::builder().uri("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }
}
