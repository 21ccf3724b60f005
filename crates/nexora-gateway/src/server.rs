use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use nexora_core::RagService;
use nexora_llm::{Embedder, Generator};
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::router::build_router;

pub(crate) struct AppState<E, G> {
    pub service: Arc<RagService<E, G>>,
    pub started_at: Instant,
}

impl<E, G> Clone for AppState<E, G> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            started_at: self.started_at,
        }
    }
}

pub struct GatewayServer<E, G> {
    addr: SocketAddr,
    auth_token: Option<String>,
    rate_limit: u32,
    max_body_size: usize,
    service: Arc<RagService<E, G>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<E, G> GatewayServer<E, G>
where
    E: Embedder + 'static,
    G: Generator + 'static,
{
    #[must_use]
    pub fn new(
        bind: &str,
        port: u16,
        service: Arc<RagService<E, G>>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        if bind == "0.0.0.0" {
            tracing::warn!("gateway binding to 0.0.0.0, make sure an auth token is set");
        }

        Self {
            addr,
            auth_token: None,
            rate_limit: 120,
            max_body_size: 1_048_576,
            service,
            shutdown_rx,
        }
    }

    #[must_use]
    pub fn with_auth(mut self, token: Option<String>) -> Self {
        self.auth_token = token.filter(|t| !t.is_empty());
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, limit: u32) -> Self {
        self.rate_limit = limit;
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Serve until the shutdown channel flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or encounters a fatal I/O error.
    pub async fn serve(self) -> Result<(), GatewayError> {
        if self.auth_token.is_none() {
            tracing::warn!("gateway auth disabled, every request is accepted");
        }
        let state = AppState {
            service: self.service,
            started_at: Instant::now(),
        };

        let router = build_router(state, self.auth_token, self.rate_limit, self.max_body_size);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::Bind(self.addr.to_string(), e))?;
        tracing::info!("gateway listening on {}", self.addr);

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            tracing::info!("gateway shutting down");
        })
        .await
        .map_err(|e| GatewayError::Server(format!("{e}")))?;

        Ok(())
    }
}
