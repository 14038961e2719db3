use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::FutureExt;
use futures::stream::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::watcher;
use rand::{thread_rng, Rng};
use tracing::{event, Level};

use crate::crd::Client;
use crate::finalizer::FINALIZER_NAME;
use crate::reconciler::{Outcome, Reconciler};

/// Delay before the pass that follows a create.
const REQUEUE_DELAY: Duration = Duration::from_secs(1);

/// The [`Controller`] watches `Client` objects (and the `Secret`s they own),
/// handing each changed object to the [`Reconciler`].
pub struct Controller {
    controller: kube_runtime::controller::Controller<Client>,
    reconciler: Arc<Reconciler>,
}

impl Controller {
    /// Creates a controller watching `Client`s in the given `namespace` only.
    /// A [`watcher::Config`] can be given to limit the objects watched (for
    /// instance, `watcher::Config::default().labels("team=identity")`).
    pub fn namespaced(
        client: kube::Client,
        reconciler: Reconciler,
        namespace: &str,
        wc: watcher::Config,
    ) -> Self {
        Self::new(
            Api::namespaced(client.clone(), namespace),
            Api::namespaced(client, namespace),
            reconciler,
            wc,
        )
    }

    /// Creates a controller watching `Client`s across all namespaces.
    pub fn namespaced_all(client: kube::Client, reconciler: Reconciler, wc: watcher::Config) -> Self {
        Self::new(Api::all(client.clone()), Api::all(client), reconciler, wc)
    }

    fn new(
        clients: Api<Client>,
        secrets: Api<Secret>,
        reconciler: Reconciler,
        wc: watcher::Config,
    ) -> Self {
        let controller = kube_runtime::controller::Controller::new(clients, wc)
            .owns(secrets, watcher::Config::default())
            .shutdown_on_signal();
        Self {
            controller,
            reconciler: Arc::new(reconciler),
        }
    }

    /// Run the controller until a termination signal is received. Errors are
    /// retried with exponential backoff per object; successful objects are
    /// resynced every 40 to 60 minutes.
    pub async fn run(self) {
        let Self {
            controller,
            reconciler,
        } = self;
        let backoffs = Arc::new(Mutex::new(BTreeMap::new()));
        let backoffs = &backoffs;
        controller
            .run(
                |client, reconciler| {
                    let key = object_key(&client);
                    let namespace = client.namespace().unwrap_or_default();
                    let name = client.name_any();
                    event!(
                        Level::INFO,
                        resource_name = %name,
                        controller = FINALIZER_NAME,
                        "Reconciling Client ({}).",
                        if client.meta().deletion_timestamp.is_some() {
                            "cleanup"
                        } else {
                            "apply"
                        }
                    );
                    let backoffs = Arc::clone(backoffs);
                    async move { reconciler.reconcile(&namespace, &name).await }
                        .map(|result| result.map(success_action))
                        .inspect(move |result| {
                            if result.is_ok() {
                                backoffs
                                    .lock()
                                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                                    .remove(&key);
                            }
                        })
                },
                |client, err, _| {
                    let consecutive_errors = {
                        let mut backoffs = backoffs
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner());
                        let consecutive_errors: &mut u32 =
                            backoffs.entry(object_key(&client)).or_default();
                        let previous = *consecutive_errors;
                        *consecutive_errors = previous.saturating_add(1);
                        previous
                    };
                    event!(
                        Level::WARN,
                        err = %err,
                        resource_name = %client.name_any(),
                        consecutive_errors,
                        "Client reconciliation failed, backing off."
                    );
                    Action::requeue(error_delay(consecutive_errors))
                },
                reconciler,
            )
            .for_each(|reconciliation_result| async move {
                match reconciliation_result {
                    Ok(resource) => {
                        event!(
                            Level::INFO,
                            resource_name = %resource.0.name,
                            controller = FINALIZER_NAME,
                            "Client reconciliation successful."
                        );
                    }
                    Err(err) => event!(
                        Level::ERROR,
                        err = %err,
                        source = err.source(),
                        controller = FINALIZER_NAME,
                        "Client reconciliation error."
                    ),
                }
            })
            .await
    }
}

fn object_key(client: &Client) -> String {
    format!(
        "{}/{}",
        client.namespace().unwrap_or_default(),
        client.name_any()
    )
}

fn success_action(outcome: Outcome) -> Action {
    Action::requeue(success_delay(outcome))
}

/// A requeue requested by the reconciler runs shortly; otherwise the object is
/// resynced at a random time between 40 and 60 minutes in the future.
fn success_delay(outcome: Outcome) -> Duration {
    match outcome {
        Outcome::Requeue => REQUEUE_DELAY,
        Outcome::Done => Duration::from_secs(thread_rng().gen_range(2400..3600)),
    }
}

/// Exponential backoff with a max of 256 seconds and some added randomization
/// to avoid thundering herds.
fn error_delay(consecutive_errors: u32) -> Duration {
    let seconds = 2u64.pow(consecutive_errors.min(7) + 1);
    Duration::from_millis(thread_rng().gen_range((seconds * 500)..(seconds * 1000)))
}
