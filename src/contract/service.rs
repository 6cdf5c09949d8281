//! The invocation seam every service plugs into.
//!
//! Decomposed services, remote endpoints and the legacy monolith all
//! implement [`Service`]. The router never knows which kind it is talking to:
//! it holds `Arc<dyn Service>` handles in a [`ServiceTable`] resolved at
//! startup.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                   Router                      │
//! │  create_health_record → health-records        │
//! │  get_death_stats      → health-death          │
//! │  (unmapped)           → farm-legacy (shim)    │
//! └──────────────────────────────────────────────┘
//!        │                  │                │
//!   LocalService      RemoteService      LegacyShim
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::envelope::RawReply;
use super::types::{RequestEnvelope, ServiceId};
use crate::registry::{ActionRegistry, ActionStatus, PlanError};

// ---------------------------------------------------------------------------
// ServiceError
// ---------------------------------------------------------------------------

/// Failures a service can report instead of a reply.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The payload did not match the action's request type.
    #[error("invalid payload: {0}")]
    Validation(String),

    /// The service does not own the action.
    #[error("unsupported action: {0}")]
    UnknownAction(String),

    /// The action ran and was refused by a business rule.
    #[error("{0}")]
    Rejected(String),

    /// The handler failed unexpectedly.
    #[error("handler failed: {0}")]
    Failed(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

// ---------------------------------------------------------------------------
// Service trait
// ---------------------------------------------------------------------------

/// An independently deployable unit that owns and executes a set of actions.
///
/// The reply may be a ready envelope or arbitrary JSON; the router passes it
/// through [`normalize`](super::envelope::normalize) before returning it.
#[async_trait]
pub trait Service: Send + Sync {
    fn id(&self) -> &ServiceId;

    /// Whether this service holds a handler for `action`, if it can tell.
    /// Remote endpoints and the legacy shim answer `None`.
    fn can_execute(&self, _action: &str) -> Option<bool> {
        None
    }

    async fn invoke(&self, request: RequestEnvelope) -> Result<RawReply, ServiceError>;
}

// ---------------------------------------------------------------------------
// ServiceDescriptor / ServiceTable
// ---------------------------------------------------------------------------

/// A bound service together with the actions the registry assigns to it.
#[derive(Clone)]
pub struct ServiceDescriptor {
    pub id: ServiceId,
    pub handle: Arc<dyn Service>,
    pub owned_actions: BTreeSet<String>,
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("id", &self.id)
            .field("owned_actions", &self.owned_actions)
            .finish()
    }
}

/// Service handles bound at process start, keyed by id.
#[derive(Default, Clone)]
pub struct ServiceTable {
    handles: HashMap<ServiceId, Arc<dyn Service>>,
}

impl ServiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a service under its own id. Replaces any earlier binding.
    pub fn bind(&mut self, handle: Arc<dyn Service>) {
        let id = handle.id().clone();
        log::info!("ServiceTable: bound service '{}'", id);
        self.handles.insert(id, handle);
    }

    pub fn with(mut self, handle: Arc<dyn Service>) -> Self {
        self.bind(handle);
        self
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Service>> {
        self.handles.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handles.contains_key(id)
    }

    pub fn ids(&self) -> BTreeSet<ServiceId> {
        self.handles.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Fail unless every service the registry can route to has a handle, and
    /// every active action lands on a service able to run it.
    pub fn check_covers(&self, registry: &ActionRegistry) -> Result<(), PlanError> {
        let legacy = registry.legacy_service();
        if !self.contains(legacy.as_str()) {
            return Err(PlanError::UnboundService(legacy.clone()));
        }
        for descriptor in registry.descriptors() {
            let handle = self
                .get(descriptor.target_service.as_str())
                .ok_or_else(|| PlanError::UnboundService(descriptor.target_service.clone()))?;
            if descriptor.status == ActionStatus::Deprecated {
                continue;
            }
            if handle.can_execute(&descriptor.canonical_name) == Some(false) {
                return Err(PlanError::MissingHandler {
                    action: descriptor.canonical_name.clone(),
                    service: descriptor.target_service.clone(),
                });
            }
        }
        Ok(())
    }

    /// Describe every bound service with the actions `registry` assigns to it.
    pub fn descriptors(&self, registry: &ActionRegistry) -> Vec<ServiceDescriptor> {
        let mut out: Vec<ServiceDescriptor> = self
            .handles
            .iter()
            .map(|(id, handle)| ServiceDescriptor {
                id: id.clone(),
                handle: Arc::clone(handle),
                owned_actions: registry.actions_for(id.as_str()),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}

impl std::fmt::Debug for ServiceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceTable")
            .field("services", &self.ids())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
