#![allow(clippy::style)]
#![allow(clippy::complexity)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::mutable_key_type)]
#![allow(clippy::stable_sort_primitive)]
#![allow(clippy::map_entry)]
#![allow(clippy::box_default)]
#![warn(clippy::bool_comparison)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::no_effect)]
#![warn(clippy::unnecessary_unwrap)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::todo)]
#![warn(clippy::wildcard_dependencies)]
#![warn(clippy::zero_prefixed_literal)]
#![warn(clippy::borrowed_box)]
#![warn(clippy::deref_addrof)]
#![warn(clippy::double_must_use)]
#![warn(clippy::double_parens)]
#![warn(clippy::extra_unused_lifetimes)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_question_mark)]
#![warn(clippy::needless_return)]
#![warn(clippy::redundant_pattern)]
#![warn(clippy::redundant_slicing)]
#![warn(clippy::redundant_static_lifetimes)]
#![warn(clippy::single_component_path_imports)]
#![warn(clippy::unnecessary_cast)]
#![warn(clippy::useless_asref)]
#![warn(clippy::useless_conversion)]
#![warn(clippy::builtin_type_shadow)]
#![warn(clippy::duplicate_underscore_argument)]
#![warn(double_negations)]
#![warn(clippy::unnecessary_mut_passed)]
#![warn(clippy::wildcard_in_or_patterns)]
#![warn(clippy::crosspointer_transmute)]
#![warn(clippy::excessive_precision)]
#![warn(clippy::panicking_overflow_checks)]
#![warn(clippy::as_conversions)]
#![warn(clippy::match_overlapping_arm)]
#![warn(clippy::zero_divided_by_zero)]
#![warn(clippy::must_use_unit)]
#![warn(clippy::suspicious_assignment_formatting)]
#![warn(clippy::suspicious_else_formatting)]
#![warn(clippy::suspicious_unary_op_formatting)]
#![warn(clippy::mut_mutex_lock)]
#![warn(clippy::print_literal)]
#![warn(clippy::same_item_push)]
#![warn(clippy::useless_format)]
#![warn(clippy::write_literal)]
#![warn(clippy::redundant_closure)]
#![warn(clippy::redundant_closure_call)]
#![warn(clippy::unnecessary_lazy_evaluations)]
#![warn(clippy::partialeq_ne_impl)]
#![warn(clippy::redundant_field_names)]
#![warn(clippy::transmutes_expressible_as_ptr_casts)]
#![warn(clippy::unused_async)]
#![warn(clippy::disallowed_methods)]
#![warn(clippy::disallowed_macros)]
#![warn(clippy::disallowed_types)]
#![warn(clippy::from_over_into)]
//! A Kubernetes controller that keeps Auth0 client applications in sync with
//! `Client` custom resources (`auth0.gracey.io/v1alpha1`).
//!
//! For each `Client` the [`Reconciler`] creates the Auth0 client when
//! `status.auth0Id` is empty, pushes the desired configuration to Auth0 on every later pass,
//! optionally copies the client secret into a `Secret` owned by the `Client`,
//! and deletes the Auth0 client when the `Client` is deleted. A finalizer
//! holds the `Client` until that deletion has succeeded.
//!
//! All collaborators are injected, so the reconciler can run against the API
//! server and a real tenant, or against anything else implementing the
//! [`ClientStore`], [`SecretStore`], [`ClientApi`] and [`EventReporter`]
//! traits:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use auth0_client_controller::{
//! #     Controller, Credentials, KubeEventReporter, KubeStore, ManagementApi, Reconciler,
//! # };
//! # use kube_runtime::watcher;
//! # async fn foo() {
//! let kube_client = kube::Client::try_default().await.unwrap();
//! let store = Arc::new(KubeStore::new(kube_client.clone()));
//! let reconciler = Reconciler::new(
//!     store.clone(),
//!     store,
//!     Arc::new(ManagementApi::new(Credentials {
//!         domain: "my-tenant.eu.auth0.com".into(),
//!         client_id: "management-client-id".into(),
//!         client_secret: "management-client-secret".into(),
//!     })),
//!     Arc::new(KubeEventReporter::new(kube_client.clone(), "auth0-client-controller")),
//! );
//! Controller::namespaced_all(kube_client, reconciler, watcher::Config::default())
//!     .run()
//!     .await;
//! # }
//! ```

pub mod auth0;
pub mod config;
mod controller;
pub mod crd;
mod error;
pub mod events;
mod finalizer;
mod reconciler;
pub mod secret;
pub mod store;
#[cfg(test)]
mod testing;

pub use auth0::{ClientApi, Credentials, ManagementApi, RemoteClient};
pub use controller::Controller;
pub use crd::{Client, ClientSpec, ClientStatus};
pub use error::{Error, Result};
pub use events::{ClientEvent, EventReporter, KubeEventReporter};
pub use finalizer::{FinalizerGuard, FINALIZER_NAME};
pub use reconciler::{Outcome, Reconciler};
pub use store::{ClientStore, KubeStore, SecretStore};
