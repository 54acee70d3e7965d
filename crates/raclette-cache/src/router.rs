//! Route table and middleware.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all cache endpoints.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.body_limit();
    Router::new()
        .route("/health", get(handler::health_handler))
        .route(
            "/raclette/:key",
            post(handler::save_handler)
                .get(handler::find_handler)
                .delete(handler::delete_handler),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
