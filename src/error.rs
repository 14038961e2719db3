//! Error type shared by the reconciler and its collaborators.

use crate::auth0;

/// Errors surfaced from a reconciliation. Every variant causes the
/// [`Controller`](crate::Controller) to redeliver the object after a backoff.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    #[error("auth0 api error: {0}")]
    Auth0(#[from] auth0::Error),

    #[error("secret {secret} has no key {key}")]
    MissingSecretKey { secret: String, key: String },

    #[error("secret {secret} referenced by key {key} does not exist")]
    SecretNotFound { secret: String, key: String },

    #[error("invalid client spec: {0}")]
    Validation(String),

    #[error("object is missing {0}")]
    MissingObjectKey(&'static str),

    #[error("auth0 client {0} did not return a client secret")]
    MissingClientSecret(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
