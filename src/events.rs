//! Kubernetes events describing what happened to a `Client`'s Auth0 client.
//! Events are informational only; nothing reads them back.

use async_trait::async_trait;
use kube::Resource;
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::{event, Level};

use crate::crd::Client;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    Created { id: String },
    CreateFailed { error: String },
    Updated { id: String },
    UpdateFailed { error: String },
    Deleted { id: String },
    DeleteFailed { error: String },
}

impl ClientEvent {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Created { .. } => "Created",
            Self::CreateFailed { .. } => "CreateFailed",
            Self::Updated { .. } => "Updated",
            Self::UpdateFailed { .. } => "UpdateFailed",
            Self::Deleted { .. } => "Deleted",
            Self::DeleteFailed { .. } => "DeleteFailed",
        }
    }

    fn event_type(&self) -> EventType {
        match self {
            Self::Created { .. } | Self::Updated { .. } | Self::Deleted { .. } => EventType::Normal,
            _ => EventType::Warning,
        }
    }

    /// Human readable note, naming the client by its declared name.
    pub fn note(&self, client_name: &str) -> String {
        match self {
            Self::Created { id } => format!("Created client {client_name} (ID: {id})"),
            Self::Updated { id } => format!("Updated client {client_name} (ID: {id})"),
            Self::Deleted { id } => format!("Deleted client {client_name} (ID: {id})"),
            Self::CreateFailed { error }
            | Self::UpdateFailed { error }
            | Self::DeleteFailed { error } => error.clone(),
        }
    }
}

/// One-way sink for [`ClientEvent`]s.
#[async_trait]
pub trait EventReporter: Send + Sync {
    async fn report(&self, client: &Client, event: ClientEvent);
}

/// Publishes events to the API server, attached to the `Client` object.
pub struct KubeEventReporter {
    client: kube::Client,
    reporter: Reporter,
}

impl KubeEventReporter {
    pub fn new(client: kube::Client, controller: &str) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: controller.to_owned(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }
}

#[async_trait]
impl EventReporter for KubeEventReporter {
    async fn report(&self, client: &Client, ev: ClientEvent) {
        let recorder = Recorder::new(
            self.client.clone(),
            self.reporter.clone(),
            client.object_ref(&()),
        );
        let result = recorder
            .publish(Event {
                type_: ev.event_type(),
                reason: ev.reason().to_owned(),
                note: Some(ev.note(&client.spec.name)),
                action: "Reconcile".to_owned(),
                secondary: None,
            })
            .await;
        if let Err(err) = result {
            event!(
                Level::WARN,
                err = %err,
                resource_name = %client.meta().name.as_deref().unwrap_or_default(),
                reason = ev.reason(),
                "Failed to publish event."
            );
        }
    }
}
