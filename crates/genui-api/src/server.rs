use crate::{create_router, AppState};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(120);

pub struct Server {
    state: AppState,
    addr: SocketAddr,
}

impl Server {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { state, addr }
    }

    pub async fn run(self) -> Result<()> {
        let service = self.state.service.clone();
        let router = create_router(self.state);

        let listener = {
            let socket = if self.addr.is_ipv6() {
                tokio::net::TcpSocket::new_v6()
            } else {
                tokio::net::TcpSocket::new_v4()
            }
            .context("failed to create socket")?;

            let _ = socket.set_reuseaddr(true);
            let _ = socket.set_keepalive(true);

            socket
                .bind(self.addr)
                .with_context(|| format!("failed to bind {}", self.addr))?;
            socket.listen(1024)?
        };

        info!("GenUI server listening on http://{}", self.addr);
        info!("  POST /api/generate - Start a background generation");
        info!("  GET  /api/generations[/{{id}}] - Generation records");
        info!("  GET  /api/view/{{id}} - Generated page");
        info!("  GET  /generate?prompt=<text> - Synchronous generation");
        info!("  GET|PUT /api/config, POST /api/config/reset - Runtime configuration");
        info!("  GET  /api/events - Progress stream (SSE)");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;

        info!("HTTP server stopped, waiting for running generations");
        if !service.shutdown(Some(DRAIN_TIMEOUT)).await {
            warn!("Some generations were still running after {:?}", DRAIN_TIMEOUT);
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
