use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::{
    AppState,
    handlers::{scan_handlers, ws_handlers},
    middleware::identity,
};

/// Create all v1 API routes.
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        // Scan submission and lifecycle (identity required)
        .route("/scan", post(scan_handlers::submit_scan_handler))
        .route("/scan/{task_id}", get(scan_handlers::scan_status_handler))
        .route(
            "/scan/{task_id}/cancel",
            post(scan_handlers::cancel_scan_handler),
        )
        .route("/collectors", get(scan_handlers::list_collectors_handler))
        .route("/credits", get(scan_handlers::credits_handler))
        .route("/history", get(scan_handlers::history_handler))
        .route_layer(middleware::from_fn(identity::identity_middleware))
        // Live status: the task id is the capability, like the original
        // dashboard's socket endpoint.
        .route(
            "/ws/scan/{task_id}",
            axum::routing::any(ws_handlers::scan_ws_handler),
        )
        .route("/health", get(scan_handlers::health_handler))
}
