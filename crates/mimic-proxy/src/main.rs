use anyhow::Context;
use clap::Parser;
use mimic_proxy::admin_api::{AdminApiServer, AdminState};
use mimic_proxy::config::{Config, LogFormat, ValueStore};
use mimic_proxy::logging::init_tracing;
use mimic_proxy::pipeline::{create_http_client, Pipeline, ProxyServer, DRAIN_TIMEOUT};
use mimic_proxy::store::WorkspaceRegistry;
use mimic_proxy::template::Renderer;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Time between closing the stores and stopping the listeners, so live
/// streams can flush their last events.
const CLOSE_GRACE: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "mimic", version, about = "Programmable HTTP mock and proxy")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "MIMIC_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "MIMIC_PROXY_PORT")]
    proxy_port: Option<u16>,

    #[arg(long, env = "MIMIC_ADMIN_PORT")]
    admin_port: Option<u16>,

    /// Root for workspaces and persisted values
    #[arg(long, env = "MIMIC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Host substituted for localhost in proxy targets
    #[arg(long, env = "MIMIC_LOCALHOST_ALIAS")]
    localhost_alias: Option<String>,

    /// json or console
    #[arg(long, env = "MIMIC_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(port) = self.proxy_port {
            config.listen.proxy_port = port;
        }
        if let Some(port) = self.admin_port {
            config.listen.admin_port = port;
        }
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(alias) = self.localhost_alias {
            config.localhost_alias = Some(alias);
        }
        if let Some(format) = self.log_format {
            config.log.format = format;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;
    init_tracing(config.log.format, &config.log.level)?;

    let host: IpAddr = config
        .listen
        .host
        .parse()
        .with_context(|| format!("invalid listen host '{}'", config.listen.host))?;

    let values = Arc::new(
        ValueStore::load(config.values.clone(), &config.values_path())
            .context("failed to load config values")?,
    );
    let registry = Arc::new(
        WorkspaceRegistry::new(
            config.workspaces_dir(),
            config.max_traffic_entries,
            config.subscriber_buffer,
        )
        .context("failed to prepare workspaces")?,
    );
    let client = create_http_client(&config.connection_pool);

    let pipeline = Arc::new(
        Pipeline::new(Arc::clone(&registry), Renderer::new(Arc::clone(&values)), client)
            .with_localhost_alias(config.localhost_alias.clone()),
    );

    let proxy = ProxyServer::bind(pipeline, SocketAddr::new(host, config.listen.proxy_port))
        .with_context(|| format!("failed to bind proxy port {}", config.listen.proxy_port))?;
    let admin = AdminApiServer::bind(
        SocketAddr::new(host, config.listen.admin_port),
        AdminState {
            registry: Arc::clone(&registry),
            values,
            interceptor: None,
        },
    )
    .with_context(|| format!("failed to bind admin port {}", config.listen.admin_port))?;

    info!(
        data_dir = %config.data_dir.display(),
        "mimic started (proxy {}, admin {})",
        config.listen.proxy_port,
        config.listen.admin_port
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let proxy_task = tokio::spawn(proxy.run_until(stopped(stop_rx.clone()), DRAIN_TIMEOUT));
    let admin_task = tokio::spawn(admin.run_until(stopped(stop_rx), DRAIN_TIMEOUT));

    shutdown_signal().await;
    info!("Shutting down");

    registry.close_all();
    tokio::time::sleep(CLOSE_GRACE).await;
    let _ = stop_tx.send(true);

    let listeners = async {
        for (name, task) in [("proxy", proxy_task), ("admin", admin_task)] {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("{} listener failed: {}", name, e),
                Err(e) => error!("{} listener task panicked: {}", name, e),
            }
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, listeners).await.is_err() {
        error!("Listeners did not stop within {:?}", DRAIN_TIMEOUT);
    }

    info!("mimic stopped");
    Ok(())
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
