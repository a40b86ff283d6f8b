//! Shared harness: both listeners on ephemeral ports over a temp data dir.

#![allow(dead_code)]

use mimic_proxy::admin_api::{AdminApiServer, AdminState};
use mimic_proxy::config::{ConnectionPoolConfig, ValueStore};
use mimic_proxy::pipeline::{create_http_client, Pipeline, ProxyServer};
use mimic_proxy::store::WorkspaceRegistry;
use mimic_proxy::template::Renderer;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

pub struct TestServer {
    pub proxy_url: String,
    pub admin_url: String,
    pub registry: Arc<WorkspaceRegistry>,
    pub values: Arc<ValueStore>,
    pub data_dir: TempDir,
    stop: watch::Sender<bool>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with_values(BTreeMap::new()).await
    }

    pub async fn start_with_values(values: BTreeMap<String, String>) -> Self {
        let data_dir = TempDir::new().unwrap();
        let registry =
            Arc::new(WorkspaceRegistry::new(data_dir.path().join("workspaces"), 100, 16).unwrap());
        let values = Arc::new(ValueStore::new(values));
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&registry),
            Renderer::new(Arc::clone(&values)),
            create_http_client(&ConnectionPoolConfig::default()),
        ));

        let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let proxy = ProxyServer::bind(pipeline, any).unwrap();
        let admin = AdminApiServer::bind(
            any,
            AdminState {
                registry: Arc::clone(&registry),
                values: Arc::clone(&values),
                interceptor: None,
            },
        )
        .unwrap();
        let proxy_url = format!("http://{}", proxy.local_addr().unwrap());
        let admin_url = format!("http://{}", admin.local_addr().unwrap());

        let (stop, rx) = watch::channel(false);
        let drain = Duration::from_secs(1);
        tokio::spawn(proxy.run_until(stopped(rx.clone()), drain));
        tokio::spawn(admin.run_until(stopped(rx), drain));

        Self {
            proxy_url,
            admin_url,
            registry,
            values,
            data_dir,
            stop,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.registry.close_all();
        let _ = self.stop.send(true);
    }
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Minimal upstream that echoes method, path, query and selected headers as JSON.
pub async fn start_echo_upstream() -> String {
    use http_body_util::{BodyExt, Full};
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioIo;
    use std::convert::Infallible;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let service = service_fn(|req: hyper::Request<hyper::body::Incoming>| async move {
                    let header = |name: &str| {
                        req.headers()
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("")
                            .to_string()
                    };
                    let echo = serde_json::json!({
                        "method": req.method().as_str(),
                        "path": req.uri().path(),
                        "query": req.uri().query().unwrap_or(""),
                        "host": header("host"),
                        "x_forwarded_for": header("x-forwarded-for"),
                        "x_injected": header("x-injected"),
                    });
                    let _ = req.into_body().collect().await;
                    Ok::<_, Infallible>(
                        hyper::Response::builder()
                            .header("content-type", "application/json")
                            .header("x-upstream", "echo")
                            .body(Full::new(Bytes::from(echo.to_string())))
                            .unwrap(),
                    )
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    format!("http://{addr}")
}
