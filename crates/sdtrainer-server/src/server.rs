//! Binding and serving.

use crate::error::{ServerError, ServerResult};
use crate::handler::CallbackHandler;
use crate::routes::create_router;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// First port tried for the callback server.
pub const DEFAULT_CALLBACK_PORT: u16 = 6745;
/// How many consecutive ports are tried before giving up.
pub const PORT_PROBE_ATTEMPTS: u16 = 200;

/// A bound, not yet serving, callback server.
#[derive(Debug)]
pub struct CallbackServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl CallbackServer {
    /// Bind loopback on the first free port at or above `start_port`.
    pub async fn bind(start_port: u16) -> ServerResult<Self> {
        let last = start_port.saturating_add(PORT_PROBE_ATTEMPTS - 1);
        for port in start_port..=last {
            match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
                Ok(listener) => {
                    let addr = listener.local_addr()?;
                    info!(%addr, "callback server bound");
                    return Ok(Self { listener, addr });
                }
                Err(e) => debug!(port, error = %e, "port unavailable"),
            }
        }
        Err(ServerError::NoFreePort {
            first: start_port,
            last,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// URL handed to `train_network.py --callback_url`.
    pub fn callback_url(&self) -> String {
        format!("http://localhost:{}", self.addr.port())
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve<F>(self, handler: Arc<dyn CallbackHandler>, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.addr;
        info!(%addr, "appserver listening");
        axum::serve(self.listener, create_router(handler))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|source| ServerError::Serve { addr, source })?;
        info!("callback server stopped");
        Ok(())
    }
}

/// Resolve on ctrl-c, or SIGTERM on unix. A handler that cannot be installed never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
