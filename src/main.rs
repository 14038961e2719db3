use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use kube::CustomResourceExt;
use kube_runtime::watcher;
use tracing::{event, Level};
use tracing_subscriber::EnvFilter;

use auth0_client_controller::config::{Command, Config};
use auth0_client_controller::{
    Client, Controller, KubeEventReporter, KubeStore, ManagementApi, Reconciler,
};

const CONTROLLER_NAME: &str = "auth0-client-controller";

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,kube=warn"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    if let Some(Command::Crd) = config.command {
        print!("{}", serde_yaml::to_string(&Client::crd())?);
        return Ok(());
    }

    init_tracing(config.log_json);
    let credentials = config.credentials()?;

    let kube_client = kube::Client::try_default()
        .await
        .context("unable to build kubernetes client")?;
    let store = Arc::new(KubeStore::new(kube_client.clone()));
    let reconciler = Reconciler::new(
        store.clone(),
        store,
        Arc::new(ManagementApi::new(credentials)),
        Arc::new(KubeEventReporter::new(kube_client.clone(), CONTROLLER_NAME)),
    );

    let mut wc = watcher::Config::default();
    if let Some(selector) = &config.selector {
        wc = wc.labels(selector);
    }
    let controller = match &config.namespace {
        Some(namespace) => Controller::namespaced(kube_client, reconciler, namespace, wc),
        None => Controller::namespaced_all(kube_client, reconciler, wc),
    };

    event!(
        Level::INFO,
        namespace = config.namespace.as_deref().unwrap_or("*"),
        "Starting {}.",
        CONTROLLER_NAME
    );
    controller.run().await;
    event!(Level::INFO, "{} stopped.", CONTROLLER_NAME);
    Ok(())
}
