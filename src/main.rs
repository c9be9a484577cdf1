use config_resync_controller::config::Config;
use config_resync_controller::error::ControllerError;
use config_resync_controller::supervisor;
use kube::config::KubeConfigOptions;
use tracing::{error, info};
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{fmt, layer::SubscriberExt as _, EnvFilter};

#[tokio::main]
async fn main() {
    setup_tracing();

    let kube_config = match discover_kubernetes_config().await {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "failed to find a suitable Kubernetes client config");
            std::process::exit(1);
        }
    };

    let client = match kube::Client::try_from(kube_config) {
        Ok(client) => client,
        Err(error) => {
            error!(%error, "failed to construct Kubernetes client");
            std::process::exit(1);
        }
    };

    let config = Config::from_env();
    info!(timeout = ?config.update_resource_timeout, "starting controller");

    let mut tasks = supervisor::spawn(client, config);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        Some(result) = tasks.join_next() => {
            error!(?result, "a supervised task exited unexpectedly");
        }
    }
}

fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .expect("tracing-subscriber setup failed");
}

/// Tries a local kubeconfig first (handy for development against a real
/// cluster through e.g. `kubectl proxy`), then falls back to in-cluster
/// service-account discovery.
async fn discover_kubernetes_config() -> Result<kube::Config, ControllerError> {
    if let Ok(config) = kube::Config::from_kubeconfig(&KubeConfigOptions::default()).await {
        return Ok(config);
    }

    kube::Config::incluster_env().map_err(|_| ControllerError::ConfigDiscovery)
}
