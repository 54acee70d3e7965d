//! HTTP server lifecycle with graceful shutdown.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{CacheError, CacheResult};
use crate::handler::AppState;
use crate::router::build_router;

/// HTTP front end for a blob repository.
pub struct CacheServer {
    config: ServerConfig,
    state: AppState,
}

impl CacheServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve<F>(self, shutdown: F) -> CacheResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> CacheResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = listener.local_addr()?;
        tracing::info!(%addr, "raclette cache listening");
        axum::serve(listener, build_router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| CacheError::Internal(e.to_string()))?;
        tracing::info!(%addr, "raclette cache stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::StoreRepository;
    use raclette_store::{Options, TransactionDb};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_state() -> (AppState, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = TransactionDb::open(dir.path(), &Options::default().set_create_if_missing(true)).unwrap();
        let repo = StoreRepository::new(store, true, 1024);
        (AppState::new(Arc::new(repo), 1024), dir)
    }

    #[test]
    fn server_construction() {
        let (state, _dir) = test_state();
        let server = CacheServer::new(ServerConfig::default(), state);
        assert_eq!(server.config().bind_addr, "127.0.0.1:8080".parse().unwrap());
        let _router = server.router();
    }

    #[tokio::test]
    async fn stops_on_shutdown_signal() {
        let (state, _dir) = test_state();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = CacheServer::new(ServerConfig::default(), state);
        server.serve_on(listener, async {}).await.unwrap();
    }
}
