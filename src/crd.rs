//! The `Client` custom resource.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, ObjectValidation, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Auth0 rejects client metadata with more entries than this.
pub const MAX_METADATA_ENTRIES: usize = 10;

/// Auth0 rejects client secrets shorter than this.
pub const MIN_LITERAL_SECRET_LEN: usize = 48;

/// Desired state of an Auth0 client.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "auth0.gracey.io",
    version = "v1alpha1",
    kind = "Client",
    namespaced,
    status = "ClientStatus",
    shortname = "a0client",
    printcolumn = r#"{"name":"Auth0 ID","type":"string","jsonPath":".status.auth0Id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClientSpec {
    /// The name of the client
    #[serde(default)]
    pub name: String,

    /// The description of the client
    #[serde(default)]
    pub description: String,

    /// Allowed callback URLs for the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_urls: Option<Vec<String>>,

    /// The type of client this is
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub client_type: Option<ClientType>,

    /// The metadata associated with this client
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(schema_with = "metadata_schema")]
    pub metadata: BTreeMap<String, String>,

    #[serde(default)]
    pub client_secret: ClientSecretSpec,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    Spa,
    Native,
    Regular,
    NonInteractive,
}

fn metadata_schema(gen: &mut SchemaGenerator) -> Schema {
    SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        object: Some(Box::new(ObjectValidation {
            max_properties: Some(MAX_METADATA_ENTRIES as u32),
            additional_properties: Some(Box::new(gen.subschema_for::<String>())),
            ..Default::default()
        })),
        ..Default::default()
    }
    .into()
}

/// Where the client secret comes from and where it should be written to.
///
/// `secretRef` takes precedence over `literal`. When neither is set Auth0
/// generates the secret.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientSecretSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(length(min = 48))]
    pub literal: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_secret_ref: Option<SecretRef>,
}

/// A key within a `Secret` in the same namespace as the `Client`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct SecretRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientStatus {
    /// The Auth0 ID of this client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth0_id: Option<String>,
}

impl SecretRef {
    fn is_set(&self) -> bool {
        !self.name.is_empty() || !self.key.is_empty()
    }

    fn validate(&self, field: &str) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::validation(format!(
                "{field} names key {} but no secret",
                self.key
            )));
        }
        if self.key.is_empty() {
            return Err(Error::validation(format!(
                "{field} names secret {} but no key",
                self.name
            )));
        }
        Ok(())
    }
}

impl ClientSecretSpec {
    /// The secret to read the client secret from, if any. A reference with
    /// neither name nor key counts as unset; a partial one is left for
    /// [`ClientSpec::validate`] to reject.
    pub fn secret_ref(&self) -> Option<&SecretRef> {
        self.secret_ref.as_ref().filter(|r| r.is_set())
    }

    pub fn output_secret_ref(&self) -> Option<&SecretRef> {
        self.output_secret_ref.as_ref().filter(|r| r.is_set())
    }

    pub fn literal(&self) -> Option<&str> {
        self.literal.as_deref().filter(|l| !l.is_empty())
    }
}

impl ClientSpec {
    /// Callback URLs with an absent list normalized to an empty one. Auth0
    /// leaves callbacks untouched when the field is omitted, so the empty list
    /// is what clears them.
    pub fn callback_urls(&self) -> Vec<String> {
        self.callback_urls.clone().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.metadata.len() > MAX_METADATA_ENTRIES {
            return Err(Error::validation(format!(
                "metadata has {} entries, at most {MAX_METADATA_ENTRIES} are allowed",
                self.metadata.len()
            )));
        }
        if let Some(literal) = self.client_secret.literal() {
            if literal.len() < MIN_LITERAL_SECRET_LEN {
                return Err(Error::validation(format!(
                    "clientSecret.literal must be at least {MIN_LITERAL_SECRET_LEN} characters"
                )));
            }
        }
        if let Some(secret_ref) = self.client_secret.secret_ref() {
            secret_ref.validate("clientSecret.secretRef")?;
        }
        if let Some(output) = self.client_secret.output_secret_ref() {
            output.validate("clientSecret.outputSecretRef")?;
        }
        Ok(())
    }
}

impl Client {
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// The Auth0 ID recorded in status. `None` means no Auth0 client has been
    /// created for this object yet.
    pub fn auth0_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.auth0_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    pub fn set_auth0_id(&mut self, id: String) {
        self.status.get_or_insert_with(ClientStatus::default).auth0_id = Some(id);
    }
}
