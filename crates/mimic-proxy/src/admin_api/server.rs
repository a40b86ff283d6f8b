//! Admin API server.

use crate::admin_api::router::route_request;
use crate::config::ValueStore;
use crate::interceptor::RequestInterceptor;
use crate::pipeline::create_reusable_listener;
use crate::store::WorkspaceRegistry;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Everything the admin handlers operate on.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<WorkspaceRegistry>,
    pub values: Arc<ValueStore>,
    pub interceptor: Option<Arc<dyn RequestInterceptor>>,
}

/// Admin API server for mimic
pub struct AdminApiServer {
    listener: TcpListener,
    state: Arc<AdminState>,
}

impl AdminApiServer {
    /// Bind the admin listener. Port 0 picks an ephemeral port.
    pub fn bind(addr: SocketAddr, state: AdminState) -> std::io::Result<Self> {
        let listener = create_reusable_listener(addr)?;
        Ok(Self {
            listener,
            state: Arc::new(state),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` resolves, then wait up to `drain` for open
    /// connections.
    pub async fn run_until<F>(self, shutdown: F, drain: Duration) -> Result<(), anyhow::Error>
    where
        F: Future<Output = ()>,
    {
        info!("Admin API listening on http://{}", self.local_addr()?);

        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Failed to accept admin connection: {}", e);
                            continue;
                        }
                    };
                    let io = TokioIo::new(stream);
                    let state = Arc::clone(&self.state);
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { route_request(req, state).await }
                    });
                    let conn = graceful.watch(http1::Builder::new().serve_connection(io, service));
                    tokio::spawn(async move {
                        if let Err(e) = conn.await {
                            debug!("Admin API connection error from {}: {}", remote_addr, e);
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("Admin API stopping");
                    break;
                }
            }
        }

        drop(self.listener);
        if tokio::time::timeout(drain, graceful.shutdown()).await.is_err() {
            warn!("Admin connections still open after {:?}, abandoning them", drain);
        }
        Ok(())
    }
}
