//! # action-router
//!
//! Action router and legacy-compatibility shim for taking a monolithic
//! livestock-farm backend apart one action at a time.
//!
//! Clients keep calling with `{action, payload}`. The [`contract::Router`]
//! canonicalizes the action name, resolves it against the live
//! [`registry::Deployment`] snapshot and forwards the call to the owning
//! service. Unmapped actions fall through to the monolith, which sits behind
//! a [`legacy::LegacyShim`] that refuses anything already migrated with a
//! redirect. Every reply, whatever the service, comes back as one
//! [`contract::ResponseEnvelope`].
//!
//! The registry and the shim's exclusion set are built from the same
//! [`registry::MigrationPlan`] and swapped together, so they cannot drift.

pub mod config;
pub mod contract;
pub mod farm;
pub mod legacy;
pub mod registry;
pub mod server;
pub mod services;

#[cfg(test)]
mod scenarios;

pub use contract::{RequestEnvelope, ResponseEnvelope, Router, RouterConfig};
pub use legacy::LegacyShim;
pub use registry::{Deployment, DeploymentHandle, MigrationPlan};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
