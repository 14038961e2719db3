//! The finalizer that holds a `Client` in the API server until its Auth0
//! client has been deleted.

use kube::ResourceExt;

use crate::crd::Client;
use crate::store::ClientStore;

pub const FINALIZER_NAME: &str = "finalizer.auth0.gracey.io";

/// Idempotent add/remove of a single finalizer token. Mutations are persisted
/// immediately and the caller's copy is swapped for the stored object, so a
/// following write carries the new `resourceVersion`.
pub struct FinalizerGuard<'a> {
    store: &'a dyn ClientStore,
    name: &'a str,
}

impl<'a> FinalizerGuard<'a> {
    pub fn new(store: &'a dyn ClientStore, name: &'a str) -> Self {
        Self { store, name }
    }

    pub fn has(&self, client: &Client) -> bool {
        client.finalizers().iter().any(|f| f == self.name)
    }

    pub async fn add(&self, client: &mut Client) -> Result<(), kube::Error> {
        if self.has(client) {
            return Ok(());
        }
        client.finalizers_mut().push(self.name.to_owned());
        *client = self.store.replace(client).await?;
        Ok(())
    }

    pub async fn remove(&self, client: &mut Client) -> Result<(), kube::Error> {
        if !self.has(client) {
            return Ok(());
        }
        client.finalizers_mut().retain(|f| f != self.name);
        *client = self.store.replace(client).await?;
        Ok(())
    }
}
