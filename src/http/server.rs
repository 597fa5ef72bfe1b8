//! Inspection API server.
//!
//! # Responsibilities
//! - Create the Axum router with all inspection handlers
//! - Wire up middleware (tracing, request ID, timeout, body limit)
//! - Bind to the listener and serve until shutdown

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ListenerConfig;
use crate::http::handlers;
use crate::state::RouterHandle;

/// Largest accepted health feed body.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub handle: Arc<RouterHandle>,
}

/// HTTP server for the inspection API.
pub struct InspectionServer {
    router: Router,
}

impl InspectionServer {
    pub fn new(handle: Arc<RouterHandle>, config: &ListenerConfig) -> Self {
        let state = AppState { handle };
        Self {
            router: Self::build_router(state, Duration::from_secs(config.request_timeout_secs)),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(state: AppState, timeout: Duration) -> Router {
        Router::new()
            .route("/crs/consistenthash/cache/coveragezone", get(handlers::cache_for_coverage_zone))
            .route("/crs/consistenthash/cache/geolocation", get(handlers::cache_for_geolocation))
            .route("/crs/consistenthash/deliveryservice", get(handlers::steering_target))
            .route("/crs/consistenthash/patternbased/regex", get(handlers::pattern_based))
            .route("/crs/route/http", get(handlers::route_http))
            .route("/crs/route/dns", get(handlers::route_dns))
            .route("/crs/stats", get(handlers::get_stats))
            .route("/crs/status", get(handlers::get_status))
            .route("/crs/state", post(handlers::post_state))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
            .layer(TimeoutLayer::new(timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for in-process callers and tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Inspection API starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Inspection API stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::TrafficRouter;
    use crate::topology::CacheRegister;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn server() -> InspectionServer {
        let register = CacheRegister::from_json("{}").unwrap();
        let handle = Arc::new(RouterHandle::new(TrafficRouter::new(Arc::new(register))));
        InspectionServer::new(handle, &ListenerConfig::default())
    }

    #[tokio::test]
    async fn test_response_carries_request_id() {
        let response = server()
            .router()
            .oneshot(Request::get("/crs/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_bad_ip_is_rejected() {
        let response = server()
            .router()
            .oneshot(
                Request::get("/crs/route/http?ip=not-an-ip&host=tr.ds-a.cdn.test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_delivery_service_is_not_found() {
        let response = server()
            .router()
            .oneshot(
                Request::get("/crs/consistenthash/deliveryservice?deliveryServiceId=nope&requestPath=/a")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
