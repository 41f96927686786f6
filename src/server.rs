mod handlers;
mod responses;

pub use responses::{HealthResponse, StatusResponse};

use axum::{Router, routing::get};
use color_eyre::eyre::{Context, Result};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::housekeeping::scheduler::RunReportSlot;

/// State shared with the handlers: the registry shape and the latest run.
#[derive(Debug, Clone)]
pub struct AppState {
    pub sources_total: usize,
    pub sources_enabled: usize,
    pub last_run: RunReportSlot,
}

/// Read-only status server. It presents what the scheduler publishes and
/// never carries housekeeping logic of its own.
pub struct Server {
    router: Router,
    listener: TcpListener,
}

impl Server {
    /// Builds the router and binds the listener. Port 0 binds ephemerally;
    /// [`port`][Self::port] reports what the OS picked.
    pub async fn new(state: AppState, config: &ServerConfig) -> Result<Self> {
        let trace_layer =
            TraceLayer::new_for_http().make_span_with(|request: &'_ axum::extract::Request<_>| {
                let uri = request.uri().to_string();
                tracing::info_span!("request", method = %request.method(), uri)
            });

        let router = Router::new()
            .route("/health", get(handlers::health))
            .route("/status", get(handlers::status))
            .layer(trace_layer)
            .with_state(state);

        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding status server to {addr}"))?;

        Ok(Self { router, listener })
    }

    pub fn port(&self) -> Result<u16> {
        let addr = self
            .listener
            .local_addr()
            .context("reading the bound address")?;
        Ok(addr.port())
    }

    pub async fn run(self) -> Result<()> {
        let addr = self
            .listener
            .local_addr()
            .context("reading the bound address")?;
        info!("status server listening on http://{addr}");
        axum::serve(self.listener, self.router)
            .await
            .context("running the status server")?;
        Ok(())
    }
}
