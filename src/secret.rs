//! Reading the client secret a `Client` asks for, and writing the secret
//! Auth0 holds back into a Kubernetes `Secret`.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use tracing::{event, Level};

use crate::crd::{Client, SecretRef};
use crate::error::{Error, Result};
use crate::store::SecretStore;

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const MANAGED_BY: &str = "auth0-client-controller";

fn namespace(client: &Client) -> Result<String> {
    client
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))
}

fn secret_value<'a>(secret: &'a Secret, key: &str) -> Option<&'a [u8]> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|value| value.0.as_slice())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(key))
                .map(|value| value.as_bytes())
        })
}

/// Resolves the client secret to send to Auth0. A `secretRef` wins over a
/// literal; `None` leaves generation to Auth0.
///
/// The referenced `Secret` is read on every call, so rotating it takes effect
/// on the next reconciliation.
pub async fn resolve_client_secret(
    store: &dyn SecretStore,
    client: &Client,
) -> Result<Option<String>> {
    let spec = &client.spec.client_secret;
    let Some(secret_ref) = spec.secret_ref() else {
        return Ok(spec.literal().map(str::to_owned));
    };

    let namespace = namespace(client)?;
    let secret = store
        .get(&namespace, &secret_ref.name)
        .await?
        .ok_or_else(|| Error::SecretNotFound {
            secret: secret_ref.name.clone(),
            key: secret_ref.key.clone(),
        })?;
    let value = secret_value(&secret, &secret_ref.key).ok_or_else(|| Error::MissingSecretKey {
        secret: secret_ref.name.clone(),
        key: secret_ref.key.clone(),
    })?;
    let value = String::from_utf8(value.to_vec()).map_err(|_| {
        Error::validation(format!(
            "key {} of secret {} is not valid UTF-8",
            secret_ref.key, secret_ref.name
        ))
    })?;
    Ok(Some(value))
}

/// Writes `value` under `destination.key` of the `destination.name` secret.
///
/// A secret created here is owned by `owner`, so it is garbage collected with
/// it. An existing secret only has the one key overwritten; its other keys and
/// owner references are left alone.
pub async fn upsert_output_secret(
    store: &dyn SecretStore,
    owner: &Client,
    destination: &SecretRef,
    value: &str,
) -> Result<()> {
    let namespace = namespace(owner)?;

    if let Some(mut secret) = store.get(&namespace, &destination.name).await? {
        if secret_value(&secret, &destination.key) == Some(value.as_bytes()) {
            return Ok(());
        }
        secret
            .data
            .get_or_insert_with(BTreeMap::new)
            .insert(destination.key.clone(), ByteString(value.as_bytes().to_vec()));
        if let Some(string_data) = &mut secret.string_data {
            string_data.remove(&destination.key);
        }
        store.replace(&namespace, &secret).await?;
        event!(
            Level::INFO,
            resource_name = %owner.name_any(),
            secret = %destination.name,
            "Updated output secret."
        );
        return Ok(());
    }

    let owner_ref = owner
        .controller_owner_ref(&())
        .ok_or(Error::MissingObjectKey(".metadata.uid"))?;
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(destination.name.clone()),
            namespace: Some(namespace.clone()),
            labels: Some([(MANAGED_BY_LABEL.to_owned(), MANAGED_BY.to_owned())].into()),
            owner_references: Some(vec![owner_ref]),
            ..Default::default()
        },
        data: Some([(destination.key.clone(), ByteString(value.as_bytes().to_vec()))].into()),
        type_: Some("Opaque".to_owned()),
        ..Default::default()
    };
    store.create(&namespace, &secret).await?;
    event!(
        Level::INFO,
        resource_name = %owner.name_any(),
        secret = %destination.name,
        "Created output secret."
    );
    Ok(())
}
