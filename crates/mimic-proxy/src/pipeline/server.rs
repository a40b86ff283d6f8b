//! Proxy listener and accept loop.

use super::forwarding::error_response;
use super::handler::{InboundRequest, Pipeline};
use super::network::create_reusable_listener;
use super::response_ext::{ResponseBody, ResponseExt};
use futures::FutureExt;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Default time in-flight connections get to finish after shutdown starts.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ProxyServer {
    pipeline: Arc<Pipeline>,
    listener: TcpListener,
}

impl ProxyServer {
    /// Bind the proxy listener. Port 0 picks an ephemeral port.
    pub fn bind(pipeline: Arc<Pipeline>, addr: SocketAddr) -> std::io::Result<Self> {
        let listener = create_reusable_listener(addr)?;
        Ok(Self { pipeline, listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves, then give open
    /// connections up to `drain` to finish.
    pub async fn run_until<F>(self, shutdown: F, drain: Duration) -> Result<(), anyhow::Error>
    where
        F: Future<Output = ()>,
    {
        info!("Proxy listening on http://{}", self.local_addr()?);

        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Failed to accept proxy connection: {}", e);
                            continue;
                        }
                    };
                    let pipeline = Arc::clone(&self.pipeline);
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req| {
                        let pipeline = Arc::clone(&pipeline);
                        async move { serve(pipeline, req, remote_addr).await }
                    });
                    let conn = graceful.watch(http1::Builder::new().serve_connection(io, service));
                    tokio::spawn(async move {
                        if let Err(err) = conn.await {
                            debug!("Error serving connection from {}: {}", remote_addr, err);
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("Proxy listener stopping");
                    break;
                }
            }
        }

        drop(self.listener);
        if tokio::time::timeout(drain, graceful.shutdown()).await.is_err() {
            warn!("Proxy connections still open after {:?}, abandoning them", drain);
        }
        Ok(())
    }
}

/// Buffer the request, run it through the pipeline and contain panics to
/// the request that caused them.
async fn serve(
    pipeline: Arc<Pipeline>,
    req: Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<Response<ResponseBody>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read request body from {}: {}", remote_addr, e);
            return Ok(error_response(400, "Failed to read request body").into_boxed());
        }
    };

    let inbound = InboundRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
        remote_addr: Some(remote_addr),
    };

    let response = match AssertUnwindSafe(pipeline.handle(inbound)).catch_unwind().await {
        Ok(response) => response,
        Err(_) => {
            error!("Request handler panicked");
            error_response(500, "internal server error")
        }
    };
    Ok(response.into_boxed())
}
