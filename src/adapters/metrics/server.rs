//! Scrape Server - axum HTTP Surface
//!
//! Exposes the exporter via axum 0.7:
//! - `/`        — informational page
//! - `/metrics` — probe-and-render, Prometheus text format
//! - `/live`    — liveness probe

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};

use super::prometheus::content_type;
use crate::usecases::scrape::{Exporter, ProbeQuery, ScrapeError};

const INDEX_PAGE: &str = r#"<html>
<head><title>hashcheck-exporter</title></head>
<body>
<h1>hashcheck-exporter</h1>
<p><a href="/metrics">metrics</a></p>
</body>
</html>
"#;

/// Axum-based HTTP server for scrapes and liveness checks.
pub struct MetricsServer {
    /// Scrape pipeline shared by all requests.
    exporter: Arc<Exporter>,
}

impl MetricsServer {
    /// Create a new server around `exporter`.
    pub const fn new(exporter: Arc<Exporter>) -> Self {
        Self { exporter }
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(Self::index))
            .route("/metrics", get(Self::metrics))
            .route("/live", get(Self::liveness))
            .with_state(Arc::clone(&self.exporter))
    }

    /// Serve on an already bound listener until shutdown is signalled.
    #[instrument(skip_all)]
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let address = listener.local_addr()?;
        info!(address = %address, mode = ?self.exporter.mode(), "Metrics server started");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Static informational page.
    async fn index() -> Html<&'static str> {
        Html(INDEX_PAGE)
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Probe as the mode requires, then render the snapshot.
    async fn metrics(
        State(exporter): State<Arc<Exporter>>,
        Query(query): Query<ProbeQuery>,
    ) -> Result<Response, ScrapeError> {
        let body = exporter.scrape(&query).await?;
        Ok(([(header::CONTENT_TYPE, content_type())], body).into_response())
    }
}

impl IntoResponse for ScrapeError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            warn!(error = %self, "Rejected scrape request");
            StatusCode::BAD_REQUEST
        } else {
            error!(error = %self, "Scrape failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{self}\n"),
        )
            .into_response()
    }
}
