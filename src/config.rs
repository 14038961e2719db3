//! Command line and environment configuration for the controller binary.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};

use crate::auth0::Credentials;

/// Keeps Auth0 clients in sync with `Client` resources.
#[derive(Debug, Parser)]
#[command(name = "auth0-client-controller", version)]
pub struct Config {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Auth0 tenant domain, e.g. `my-tenant.eu.auth0.com`
    #[arg(long, env = "AUTH0_DOMAIN")]
    pub auth0_domain: Option<String>,

    /// Client ID of the machine-to-machine application used for the
    /// Management API
    #[arg(long, env = "AUTH0_CLIENT_ID")]
    pub auth0_client_id: Option<String>,

    #[arg(long, env = "AUTH0_CLIENT_SECRET", hide_env_values = true)]
    pub auth0_client_secret: Option<String>,

    /// Only watch `Client`s in this namespace (defaults to all namespaces)
    #[arg(short, long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Only watch `Client`s matching this label selector
    #[arg(long)]
    pub selector: Option<String>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the Client CustomResourceDefinition as YAML and exit
    Crd,
}

impl Config {
    /// Management API credentials. Only required when running the controller,
    /// so they are checked here rather than by the parser.
    pub fn credentials(&self) -> Result<Credentials> {
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow!("{name} must be set"))
        };
        Ok(Credentials {
            domain: required(&self.auth0_domain, "AUTH0_DOMAIN")?,
            client_id: required(&self.auth0_client_id, "AUTH0_CLIENT_ID")?,
            client_secret: required(&self.auth0_client_secret, "AUTH0_CLIENT_SECRET")?,
        })
    }
}
