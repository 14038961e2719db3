//! In-memory stand-ins for the API server, Auth0 and the event recorder.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::ByteString;
use kube::core::ErrorResponse;
use kube::ResourceExt;
use reqwest::StatusCode;

use crate::auth0::{self, ClientApi, JwtConfiguration, RemoteClient};
use crate::crd::{Client, ClientSpec, ClientType};
use crate::events::{ClientEvent, EventReporter};
use crate::store::{ClientStore, SecretStore};

pub const NAMESPACE: &str = "default";

pub fn client(name: &str) -> Client {
    let mut client = Client::new(
        name,
        ClientSpec {
            name: "app".into(),
            client_type: Some(ClientType::Spa),
            ..Default::default()
        },
    );
    client.metadata.namespace = Some(NAMESPACE.into());
    client
}

fn api_error(code: u16, reason: &str, message: String) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message,
        reason: reason.into(),
        code,
    })
}

type Key = (String, String);

#[derive(Default)]
struct StoreState {
    clients: BTreeMap<Key, Client>,
    secrets: BTreeMap<Key, Secret>,
    version: u64,
    client_writes: usize,
    status_writes: usize,
    secret_reads: usize,
    secret_writes: usize,
    fail_status_writes: bool,
}

impl StoreState {
    fn next_version(&mut self) -> Option<String> {
        self.version += 1;
        Some(self.version.to_string())
    }
}

/// Mimics the API server: optimistic concurrency on `resourceVersion`, and
/// objects marked for deletion disappear once their finalizers are gone.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub fn insert(&self, mut client: Client) -> Client {
        let mut state = self.state.lock().unwrap();
        client.metadata.namespace.get_or_insert_with(|| NAMESPACE.into());
        let uid = format!("uid-{}", client.name_any());
        client.metadata.uid.get_or_insert(uid);
        client.metadata.resource_version = state.next_version();
        state.clients.insert(key_of(&client), client.clone());
        client
    }

    pub fn get_client(&self, name: &str) -> Option<Client> {
        let state = self.state.lock().unwrap();
        state.clients.get(&key(NAMESPACE, name)).cloned()
    }

    /// Requests deletion, as `kubectl delete` would.
    pub fn mark_deleted(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        let k = key(NAMESPACE, name);
        let Some(mut client) = state.clients.remove(&k) else {
            return;
        };
        if client.finalizers().is_empty() {
            return;
        }
        client.metadata.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));
        client.metadata.resource_version = state.next_version();
        state.clients.insert(k, client);
    }

    pub fn insert_secret(&self, name: &str, data: &[(&str, &str)]) {
        let mut state = self.state.lock().unwrap();
        let mut secret = Secret::default();
        secret.metadata.name = Some(name.into());
        secret.metadata.namespace = Some(NAMESPACE.into());
        secret.metadata.resource_version = state.next_version();
        secret.data = Some(
            data.iter()
                .map(|(k, v)| ((*k).to_owned(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        );
        state.secrets.insert(key(NAMESPACE, name), secret);
    }

    pub fn get_secret(&self, name: &str) -> Option<Secret> {
        let state = self.state.lock().unwrap();
        state.secrets.get(&key(NAMESPACE, name)).cloned()
    }

    pub fn set_fail_status_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_status_writes = fail;
    }

    pub fn client_writes(&self) -> usize {
        self.state.lock().unwrap().client_writes
    }

    pub fn status_writes(&self) -> usize {
        self.state.lock().unwrap().status_writes
    }

    pub fn secret_reads(&self) -> usize {
        self.state.lock().unwrap().secret_reads
    }

    pub fn secret_writes(&self) -> usize {
        self.state.lock().unwrap().secret_writes
    }
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_owned(), name.to_owned())
}

fn key_of<K: ResourceExt>(obj: &K) -> Key {
    key(&obj.namespace().unwrap_or_default(), &obj.name_any())
}

fn check_version(stored: Option<&String>, given: Option<&String>, name: &str) -> Result<(), kube::Error> {
    match given {
        Some(given) if Some(given) != stored => Err(api_error(
            409,
            "Conflict",
            format!("the object {name} has been modified"),
        )),
        _ => Ok(()),
    }
}

#[async_trait]
impl ClientStore for FakeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Client>, kube::Error> {
        let state = self.state.lock().unwrap();
        Ok(state.clients.get(&key(namespace, name)).cloned())
    }

    async fn replace(&self, client: &Client) -> Result<Client, kube::Error> {
        let mut state = self.state.lock().unwrap();
        let k = key_of(client);
        let stored = state
            .clients
            .get(&k)
            .ok_or_else(|| api_error(404, "NotFound", format!("{} not found", k.1)))?;
        check_version(
            stored.metadata.resource_version.as_ref(),
            client.metadata.resource_version.as_ref(),
            &k.1,
        )?;

        let mut updated = client.clone();
        updated.status = stored.status.clone();
        updated.metadata.deletion_timestamp = stored.metadata.deletion_timestamp.clone();
        updated.metadata.resource_version = state.next_version();
        state.client_writes += 1;
        if updated.is_being_deleted() && updated.finalizers().is_empty() {
            state.clients.remove(&k);
        } else {
            state.clients.insert(k, updated.clone());
        }
        Ok(updated)
    }

    async fn replace_status(&self, client: &Client) -> Result<Client, kube::Error> {
        let mut state = self.state.lock().unwrap();
        if state.fail_status_writes {
            return Err(api_error(500, "InternalError", "status write refused".into()));
        }
        let k = key_of(client);
        let stored = state
            .clients
            .get(&k)
            .ok_or_else(|| api_error(404, "NotFound", format!("{} not found", k.1)))?;
        check_version(
            stored.metadata.resource_version.as_ref(),
            client.metadata.resource_version.as_ref(),
            &k.1,
        )?;

        let mut updated = stored.clone();
        updated.status = client.status.clone();
        updated.metadata.resource_version = state.next_version();
        state.status_writes += 1;
        state.clients.insert(k, updated.clone());
        Ok(updated)
    }
}

#[async_trait]
impl SecretStore for FakeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error> {
        let mut state = self.state.lock().unwrap();
        state.secret_reads += 1;
        Ok(state.secrets.get(&key(namespace, name)).cloned())
    }

    async fn create(&self, namespace: &str, secret: &Secret) -> Result<Secret, kube::Error> {
        let mut state = self.state.lock().unwrap();
        let k = key(namespace, &secret.name_any());
        if state.secrets.contains_key(&k) {
            return Err(api_error(409, "AlreadyExists", format!("{} already exists", k.1)));
        }
        let mut created = secret.clone();
        created.metadata.namespace = Some(namespace.to_owned());
        created.metadata.resource_version = state.next_version();
        state.secret_writes += 1;
        state.secrets.insert(k, created.clone());
        Ok(created)
    }

    async fn replace(&self, namespace: &str, secret: &Secret) -> Result<Secret, kube::Error> {
        let mut state = self.state.lock().unwrap();
        let k = key(namespace, &secret.name_any());
        let stored = state
            .secrets
            .get(&k)
            .ok_or_else(|| api_error(404, "NotFound", format!("{} not found", k.1)))?;
        check_version(
            stored.metadata.resource_version.as_ref(),
            secret.metadata.resource_version.as_ref(),
            &k.1,
        )?;
        let mut updated = secret.clone();
        updated.metadata.resource_version = state.next_version();
        state.secret_writes += 1;
        state.secrets.insert(k, updated.clone());
        Ok(updated)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Op {
    Create,
    Read,
    Update,
    Delete,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Create(RemoteClient),
    Read(String),
    Update(String, RemoteClient),
    Delete(String),
}

#[derive(Default)]
struct ApiState {
    clients: BTreeMap<String, RemoteClient>,
    next_id: u64,
    calls: Vec<Call>,
    failing: BTreeSet<Op>,
    blank_ids: bool,
}

/// Auth0 tenant held in memory. Rejects updates carrying server-assigned
/// fields the way the Management API does.
#[derive(Default)]
pub struct FakeAuth0 {
    state: Mutex<ApiState>,
}

impl FakeAuth0 {
    pub fn set_failing(&self, op: Op, failing: bool) {
        let mut state = self.state.lock().unwrap();
        if failing {
            state.failing.insert(op);
        } else {
            state.failing.remove(&op);
        }
    }

    /// Makes creates answer with an empty `client_id`.
    pub fn set_blank_ids(&self, blank: bool) {
        self.state.lock().unwrap().blank_ids = blank;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls()
            .iter()
            .filter(|call| {
                matches!(
                    (call, op),
                    (Call::Create(_), Op::Create)
                        | (Call::Read(_), Op::Read)
                        | (Call::Update(..), Op::Update)
                        | (Call::Delete(_), Op::Delete)
                )
            })
            .count()
    }

    pub fn remote(&self, id: &str) -> Option<RemoteClient> {
        self.state.lock().unwrap().clients.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().clients.len()
    }

    /// Changes the stored secret as a rotation in the Auth0 dashboard would.
    pub fn rotate_secret(&self, id: &str, secret: &str) {
        if let Some(client) = self.state.lock().unwrap().clients.get_mut(id) {
            client.client_secret = Some(secret.to_owned());
        }
    }
}

fn remote_error(status: StatusCode, message: &str) -> auth0::Error {
    auth0::Error::Api {
        status,
        message: message.to_owned(),
    }
}

fn not_found() -> auth0::Error {
    remote_error(StatusCode::NOT_FOUND, "Not Found: The client does not exist")
}

impl ApiState {
    fn record(&mut self, call: Call, op: Op) -> Result<(), auth0::Error> {
        self.calls.push(call);
        if self.failing.contains(&op) {
            return Err(remote_error(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ClientApi for FakeAuth0 {
    async fn create(&self, client: &RemoteClient) -> Result<RemoteClient, auth0::Error> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::Create(client.clone()), Op::Create)?;
        state.next_id += 1;
        let id = format!("client-{}", state.next_id);
        let mut created = client.clone();
        created.client_id = Some(id.clone());
        created
            .client_secret
            .get_or_insert_with(|| format!("generated-{id}-{}", "x".repeat(48)));
        created.signing_keys = Some(vec![serde_json::json!({"cert": "-----BEGIN CERTIFICATE-----"})]);
        created.jwt_configuration = Some(JwtConfiguration {
            alg: Some("RS256".into()),
            lifetime_in_seconds: Some(36000),
            secret_encoded: Some(false),
        });
        state.clients.insert(id, created.clone());
        if state.blank_ids {
            created.client_id = Some(String::new());
        }
        Ok(created)
    }

    async fn read(&self, id: &str) -> Result<RemoteClient, auth0::Error> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::Read(id.to_owned()), Op::Read)?;
        state.clients.get(id).cloned().ok_or_else(not_found)
    }

    async fn update(&self, id: &str, client: &RemoteClient) -> Result<(), auth0::Error> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::Update(id.to_owned(), client.clone()), Op::Update)?;
        let secret_encoded = client
            .jwt_configuration
            .as_ref()
            .and_then(|jwt| jwt.secret_encoded);
        if client.client_id.is_some() || client.signing_keys.is_some() || secret_encoded.is_some() {
            return Err(remote_error(
                StatusCode::BAD_REQUEST,
                "Bad Request: Payload validation error: 'Additional properties not allowed'",
            ));
        }
        let stored = state.clients.get_mut(id).ok_or_else(not_found)?;
        let patch = client.clone();
        macro_rules! merge {
            ($($field:ident),*) => {
                $(if patch.$field.is_some() { stored.$field = patch.$field; })*
            };
        }
        merge!(name, description, app_type, callbacks, client_metadata, client_secret);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), auth0::Error> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::Delete(id.to_owned()), Op::Delete)?;
        state.clients.remove(id).map(|_| ()).ok_or_else(not_found)
    }
}

/// Keeps every reported event as `(object name, event)`.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<(String, ClientEvent)>>,
}

impl RecordingReporter {
    pub fn reasons(&self) -> Vec<&'static str> {
        let events = self.events.lock().unwrap();
        events.iter().map(|(_, ev)| ev.reason()).collect()
    }

    pub fn events(&self) -> Vec<ClientEvent> {
        let events = self.events.lock().unwrap();
        events.iter().map(|(_, ev)| ev.clone()).collect()
    }
}

#[async_trait]
impl EventReporter for RecordingReporter {
    async fn report(&self, client: &Client, event: ClientEvent) {
        self.events.lock().unwrap().push((client.name_any(), event));
    }
}
