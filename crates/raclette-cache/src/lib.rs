//! Raclette persistent cache.
//!
//! Stores opaque blobs under string keys in the embedded `raclette-store`
//! engine and exposes them over HTTP at `/raclette/{key}`.

pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod repository;
pub mod router;
pub mod server;

pub use config::{CacheConfig, DatabaseConfig, ServerConfig, StoreConfig};
pub use error::{CacheError, CacheResult};
pub use handler::AppState;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use repository::{BlobRepository, StoreRepository};
pub use router::build_router;
pub use server::CacheServer;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use raclette_store::{Options, TransactionDb};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn health_endpoint() {
        let dir = TempDir::new().unwrap();
        let store = TransactionDb::open(dir.path(), &Options::default().set_create_if_missing(true)).unwrap();
        let state = AppState::new(Arc::new(StoreRepository::new(store, true, 1024)), 1024);

        let app = router::build_router(state);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
}
