//! Converges one `Client` object with its Auth0 client.
//!
//! `status.auth0Id` and the finalizer are the only record of progress, so
//! every step below is chosen by re-reading them and may be repeated safely:
//!
//! * no deletion timestamp, no Auth0 ID: add the finalizer, then create
//! * no deletion timestamp, Auth0 ID set: read, sync the output secret, update
//! * deletion timestamp: delete in Auth0 (if ever created), then drop the
//!   finalizer

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{event, Level};

use crate::auth0::{self, ClientApi, RemoteClient};
use crate::crd::Client;
use crate::error::{Error, Result};
use crate::events::{ClientEvent, EventReporter};
use crate::finalizer::{FinalizerGuard, FINALIZER_NAME};
use crate::secret::{resolve_client_secret, upsert_output_secret};
use crate::store::{ClientStore, SecretStore};

/// What the caller should do after a successful reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Converged; wait for the next change or the periodic resync.
    Done,
    /// Run again soon. Returned after a create so the update path can finish
    /// the output secret without waiting for another trigger.
    Requeue,
}

pub struct Reconciler {
    clients: Arc<dyn ClientStore>,
    secrets: Arc<dyn SecretStore>,
    auth0: Arc<dyn ClientApi>,
    events: Arc<dyn EventReporter>,
}

impl Reconciler {
    pub fn new(
        clients: Arc<dyn ClientStore>,
        secrets: Arc<dyn SecretStore>,
        auth0: Arc<dyn ClientApi>,
        events: Arc<dyn EventReporter>,
    ) -> Self {
        Self {
            clients,
            secrets,
            auth0,
            events,
        }
    }

    fn finalizer(&self) -> FinalizerGuard<'_> {
        FinalizerGuard::new(self.clients.as_ref(), FINALIZER_NAME)
    }

    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Outcome> {
        let Some(mut client) = self.clients.get(namespace, name).await? else {
            event!(
                Level::DEBUG,
                resource_name = %name,
                namespace = %namespace,
                "Client no longer exists."
            );
            return Ok(Outcome::Done);
        };

        if client.is_being_deleted() {
            self.delete(&mut client).await?;
            return Ok(Outcome::Done);
        }

        // Must be persisted before anything exists in Auth0, otherwise deleting
        // the object could skip the cleanup below.
        self.finalizer().add(&mut client).await?;

        client.spec.validate()?;
        let client_secret = resolve_client_secret(self.secrets.as_ref(), &client).await?;
        let submission = RemoteClient::from_spec(&client.spec, client_secret);

        match client.auth0_id().map(str::to_owned) {
            None => self.create(&mut client, submission).await,
            Some(id) => self.update(&client, &id, submission).await,
        }
    }

    async fn delete(&self, client: &mut Client) -> Result<()> {
        let finalizer = self.finalizer();
        if !finalizer.has(client) {
            return Ok(());
        }

        let Some(id) = client.auth0_id().map(str::to_owned) else {
            event!(
                Level::INFO,
                resource_name = %client.name_any(),
                client_name = %client.spec.name,
                "Auth0 ID not present, skipping deletion."
            );
            finalizer.remove(client).await?;
            return Ok(());
        };

        match self.auth0.delete(&id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                event!(
                    Level::INFO,
                    resource_name = %client.name_any(),
                    auth0_id = %id,
                    "Auth0 client already gone."
                );
            }
            Err(err) => {
                event!(
                    Level::ERROR,
                    err = %err,
                    resource_name = %client.name_any(),
                    client_name = %client.spec.name,
                    auth0_id = %id,
                    "Unable to delete Auth0 client."
                );
                self.report(client, ClientEvent::DeleteFailed { error: err.to_string() })
                    .await;
                return Err(err.into());
            }
        }

        event!(
            Level::INFO,
            resource_name = %client.name_any(),
            client_name = %client.spec.name,
            auth0_id = %id,
            "Deleted Auth0 client."
        );
        self.report(client, ClientEvent::Deleted { id }).await;
        finalizer.remove(client).await?;
        Ok(())
    }

    async fn create(&self, client: &mut Client, submission: RemoteClient) -> Result<Outcome> {
        event!(
            Level::INFO,
            resource_name = %client.name_any(),
            client_name = %client.spec.name,
            "Creating Auth0 client."
        );
        let created = match self.auth0.create(&submission).await {
            Ok(created) => created,
            Err(err) => {
                event!(
                    Level::ERROR,
                    err = %err,
                    resource_name = %client.name_any(),
                    client_name = %client.spec.name,
                    "Unable to create Auth0 client."
                );
                self.report(client, ClientEvent::CreateFailed { error: err.to_string() })
                    .await;
                return Err(err.into());
            }
        };
        let Some(id) = created.client_id.filter(|id| !id.is_empty()) else {
            let err = auth0::Error::MissingClientId;
            event!(
                Level::ERROR,
                err = %err,
                resource_name = %client.name_any(),
                client_name = %client.spec.name,
                "Auth0 did not return a client ID."
            );
            self.report(client, ClientEvent::CreateFailed { error: err.to_string() })
                .await;
            return Err(err.into());
        };

        client.set_auth0_id(id.clone());
        match self.clients.replace_status(client).await {
            Ok(stored) => *client = stored,
            Err(err) => {
                self.compensate_create(client, &id, &err).await;
                return Err(err.into());
            }
        }

        event!(
            Level::INFO,
            resource_name = %client.name_any(),
            client_name = %client.spec.name,
            auth0_id = %id,
            "Created Auth0 client."
        );
        self.report(client, ClientEvent::Created { id }).await;
        Ok(Outcome::Requeue)
    }

    /// Deletes a client whose ID could not be recorded. Left alone, the next
    /// reconciliation would create a second one and this one would never be
    /// cleaned up.
    async fn compensate_create(&self, client: &Client, id: &str, status_err: &kube::Error) {
        event!(
            Level::ERROR,
            err = %status_err,
            resource_name = %client.name_any(),
            auth0_id = %id,
            "Unable to record Auth0 ID, deleting the new Auth0 client."
        );
        let error = match self.auth0.delete(id).await {
            Ok(()) => format!(
                "recording Auth0 ID {id} failed, the new client was deleted: {status_err}"
            ),
            Err(delete_err) => {
                event!(
                    Level::ERROR,
                    err = %delete_err,
                    resource_name = %client.name_any(),
                    auth0_id = %id,
                    "Unable to delete orphaned Auth0 client."
                );
                format!(
                    "recording Auth0 ID {id} failed ({status_err}) and deleting the orphaned client failed ({delete_err})"
                )
            }
        };
        self.report(client, ClientEvent::CreateFailed { error }).await;
    }

    async fn update(&self, client: &Client, id: &str, mut submission: RemoteClient) -> Result<Outcome> {
        let current = match self.auth0.read(id).await {
            Ok(current) => current,
            Err(err) => {
                event!(
                    Level::ERROR,
                    err = %err,
                    resource_name = %client.name_any(),
                    auth0_id = %id,
                    "Unable to read Auth0 client."
                );
                return Err(err.into());
            }
        };

        // Some tenants only hand the secret out on read, so it is copied out
        // before the update can change anything.
        if let Some(destination) = client.spec.client_secret.output_secret_ref() {
            let value = current
                .client_secret
                .as_deref()
                .ok_or_else(|| Error::MissingClientSecret(id.to_owned()))?;
            upsert_output_secret(self.secrets.as_ref(), client, destination, value).await?;
        }

        submission.strip_server_assigned();
        if let Err(err) = self.auth0.update(id, &submission).await {
            event!(
                Level::ERROR,
                err = %err,
                resource_name = %client.name_any(),
                client_name = %client.spec.name,
                auth0_id = %id,
                "Unable to update Auth0 client."
            );
            self.report(client, ClientEvent::UpdateFailed { error: err.to_string() })
                .await;
            if let Err(status_err) = self.clients.replace_status(client).await {
                event!(
                    Level::WARN,
                    err = %status_err,
                    resource_name = %client.name_any(),
                    "Unable to update Client status."
                );
            }
            return Err(err.into());
        }

        event!(
            Level::DEBUG,
            resource_name = %client.name_any(),
            auth0_id = %id,
            "Updated Auth0 client."
        );
        self.report(client, ClientEvent::Updated { id: id.to_owned() })
            .await;
        Ok(Outcome::Done)
    }

    async fn report(&self, client: &Client, ev: ClientEvent) {
        self.events.report(client, ev).await;
    }
}
