//! Access to the Kubernetes objects the reconciler reads and writes.
//!
//! Writes go through `replace`, so they carry the object's `resourceVersion`
//! and fail with a 409 conflict when the caller's copy is stale.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, PostParams};
use kube::ResourceExt;

use crate::crd::Client;

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Client>, kube::Error>;

    /// Replaces metadata and spec. Used for finalizer changes.
    async fn replace(&self, client: &Client) -> Result<Client, kube::Error>;

    /// Replaces the status subresource.
    async fn replace_status(&self, client: &Client) -> Result<Client, kube::Error>;
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error>;

    async fn create(&self, namespace: &str, secret: &Secret) -> Result<Secret, kube::Error>;

    async fn replace(&self, namespace: &str, secret: &Secret) -> Result<Secret, kube::Error>;
}

/// Store backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: kube::Client,
}

impl KubeStore {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn clients(&self, client: &Client) -> Result<Api<Client>, kube::Error> {
        let namespace = client.namespace().ok_or_else(|| missing_namespace(client))?;
        Ok(Api::namespaced(self.client.clone(), &namespace))
    }
}

#[async_trait]
impl ClientStore for KubeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Client>, kube::Error> {
        Api::<Client>::namespaced(self.client.clone(), namespace)
            .get_opt(name)
            .await
    }

    async fn replace(&self, client: &Client) -> Result<Client, kube::Error> {
        self.clients(client)?
            .replace(&client.name_any(), &PostParams::default(), client)
            .await
    }

    async fn replace_status(&self, client: &Client) -> Result<Client, kube::Error> {
        let data = serde_json::to_vec(client).map_err(kube::Error::SerdeError)?;
        self.clients(client)?
            .replace_status(&client.name_any(), &PostParams::default(), data)
            .await
    }
}

#[async_trait]
impl SecretStore for KubeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error> {
        Api::<Secret>::namespaced(self.client.clone(), namespace)
            .get_opt(name)
            .await
    }

    async fn create(&self, namespace: &str, secret: &Secret) -> Result<Secret, kube::Error> {
        Api::<Secret>::namespaced(self.client.clone(), namespace)
            .create(&PostParams::default(), secret)
            .await
    }

    async fn replace(&self, namespace: &str, secret: &Secret) -> Result<Secret, kube::Error> {
        Api::<Secret>::namespaced(self.client.clone(), namespace)
            .replace(&secret.name_any(), &PostParams::default(), secret)
            .await
    }
}

fn missing_namespace(client: &Client) -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".into(),
        message: format!("Client {} has no namespace", client.name_any()),
        reason: "BadRequest".into(),
        code: 400,
    })
}
