//! Auth0 Management API access for client applications.
//!
//! [`ClientApi`] is the seam the reconciler drives; [`ManagementApi`] is the
//! implementation that talks to a real tenant using a client-credentials
//! grant.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{event, Level};

use crate::crd::{ClientSpec, ClientType};

/// Tokens are refreshed this long before Auth0 says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request to auth0 failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("auth0 did not return a client_id for the created client")]
    MissingClientId,
}

impl Error {
    /// Whether Auth0 reported that the addressed client does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

/// An Auth0 client application as accepted and returned by the Management
/// API. Fields left as `None` are omitted from requests, which Auth0 treats as
/// "leave unchanged".
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct RemoteClient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callbacks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_metadata: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_keys: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_configuration: Option<JwtConfiguration>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct JwtConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime_in_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_encoded: Option<bool>,
}

impl RemoteClient {
    /// Builds the submission for a `Client` spec. `client_secret` is the
    /// resolved secret; `None` lets Auth0 generate (or keep) one.
    pub fn from_spec(spec: &ClientSpec, client_secret: Option<String>) -> Self {
        Self {
            name: Some(spec.name.clone()),
            description: Some(spec.description.clone()),
            app_type: spec.client_type.map(|t| app_type(t).to_owned()),
            callbacks: Some(spec.callback_urls()),
            client_metadata: Some(spec.metadata.clone()),
            client_secret,
            ..Default::default()
        }
    }

    /// Drops the fields Auth0 assigns itself and refuses on update.
    pub fn strip_server_assigned(&mut self) {
        self.client_id = None;
        self.signing_keys = None;
        if let Some(jwt) = &mut self.jwt_configuration {
            jwt.secret_encoded = None;
        }
        if self.jwt_configuration == Some(JwtConfiguration::default()) {
            self.jwt_configuration = None;
        }
    }
}

fn app_type(client_type: ClientType) -> &'static str {
    match client_type {
        ClientType::Spa => "spa",
        ClientType::Native => "native",
        ClientType::Regular => "regular_web",
        ClientType::NonInteractive => "non_interactive",
    }
}

/// Create/read/update/delete of Auth0 clients.
#[async_trait]
pub trait ClientApi: Send + Sync {
    /// Creates a client, returning it with its assigned `client_id` and
    /// `client_secret`.
    async fn create(&self, client: &RemoteClient) -> Result<RemoteClient, Error>;

    async fn read(&self, id: &str) -> Result<RemoteClient, Error>;

    async fn update(&self, id: &str, client: &RemoteClient) -> Result<(), Error>;

    async fn delete(&self, id: &str) -> Result<(), Error>;
}

/// Machine-to-machine credentials for the Management API.
#[derive(Clone)]
pub struct Credentials {
    pub domain: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("domain", &self.domain)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    audience: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// [`ClientApi`] backed by the Auth0 Management API v2.
pub struct ManagementApi {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    token: Mutex<Option<CachedToken>>,
}

impl ManagementApi {
    pub fn new(credentials: Credentials) -> Self {
        let base_url = base_url(&credentials.domain);
        Self {
            http: reqwest::Client::new(),
            base_url,
            credentials,
            token: Mutex::new(None),
        }
    }

    fn clients_url(&self) -> String {
        format!("{}/api/v2/clients", self.base_url)
    }

    fn client_url(&self, id: &str) -> String {
        format!("{}/api/v2/clients/{}", self.base_url, id)
    }

    async fn access_token(&self) -> Result<String, Error> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.access_token.clone());
            }
        }

        event!(Level::DEBUG, domain = %self.credentials.domain, "Requesting auth0 management token.");
        let request = self
            .http
            .post(format!("{}/oauth/token", self.base_url))
            .json(&TokenRequest {
                grant_type: "client_credentials",
                client_id: &self.credentials.client_id,
                client_secret: &self.credentials.client_secret,
                audience: format!("{}/api/v2/", self.base_url),
            });
        let response: TokenResponse = check(request.send().await?).await?.json().await?;
        let expires_in = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            access_token: response.access_token.clone(),
            expires_at: Instant::now() + expires_in,
        });
        Ok(response.access_token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, Error> {
        let token = self.access_token().await?;
        check(request.bearer_auth(token).send().await?).await
    }
}

#[async_trait]
impl ClientApi for ManagementApi {
    async fn create(&self, client: &RemoteClient) -> Result<RemoteClient, Error> {
        let created: RemoteClient = self
            .send(self.http.post(self.clients_url()).json(client))
            .await?
            .json()
            .await?;
        if created.client_id.as_deref().map_or(true, str::is_empty) {
            return Err(Error::MissingClientId);
        }
        Ok(created)
    }

    async fn read(&self, id: &str) -> Result<RemoteClient, Error> {
        Ok(self
            .send(self.http.get(self.client_url(id)))
            .await?
            .json()
            .await?)
    }

    async fn update(&self, id: &str, client: &RemoteClient) -> Result<(), Error> {
        self.send(self.http.patch(self.client_url(id)).json(client))
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        self.send(self.http.delete(self.client_url(id))).await?;
        Ok(())
    }
}

fn base_url(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('/');
    let domain = domain
        .strip_prefix("https://")
        .or_else(|| domain.strip_prefix("http://"))
        .unwrap_or(domain);
    format!("https://{domain}")
}

async fn check(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Api {
        status,
        message: error_message(status, &body),
    })
}

fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: Some(error),
            message: Some(message),
        }) => format!("{error}: {message}"),
        Ok(ErrorBody {
            message: Some(message),
            ..
        }) => message,
        _ if !body.is_empty() => body.to_owned(),
        _ => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_owned(),
    }
}
