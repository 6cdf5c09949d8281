//! Legacy shim — the monolith's front door during the migration.
//!
//! The monolith keeps its full handler table, but every call passes through
//! the exclusion set of the live deployment snapshot first. A migrated action
//! is answered with a redirect before any handler is even looked up, so a
//! stale caller that bypasses the router can never run the old implementation
//! next to the new one.
//!
//! ```text
//! execute(action)
//!   ├─ moved?    → Redirect { "<action> has moved to <service>" }   (no code runs)
//!   ├─ retired?  → Deprecated                                        (no code runs)
//!   ├─ handler?  → run original implementation
//!   └─ otherwise → RouteNotFound "unsupported action"
//! ```

use async_trait::async_trait;

use crate::contract::envelope::{normalize, RawReply};
use crate::contract::service::{Service, ServiceError};
use crate::contract::types::{CallerContext, ErrorCode, Payload, RequestEnvelope, ResponseEnvelope, ServiceId};
use crate::registry::{canonicalize, DeploymentHandle};
use crate::services::{ActionCall, ActionTable};

/// What the shim decided for one action, before anything runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyGate {
    Execute { action: String },
    Moved { action: String, service: ServiceId },
    Retired { action: String },
    Unsupported { action: String },
}

pub struct LegacyShim {
    id: ServiceId,
    handlers: ActionTable,
    deployment: DeploymentHandle,
}

impl LegacyShim {
    /// Wrap the monolith's handler table. The shim takes its service id from
    /// the deployment's `legacy_service`.
    pub fn new(handlers: ActionTable, deployment: DeploymentHandle) -> Self {
        let id = deployment.load().legacy_service().clone();
        log::info!(
            "LegacyShim: '{}' with {} original handlers",
            id,
            handlers.len()
        );
        Self {
            id,
            handlers,
            deployment,
        }
    }

    pub fn handlers(&self) -> &ActionTable {
        &self.handlers
    }

    /// Decide what happens to `action` under the live snapshot.
    pub fn gate(&self, action: &str) -> LegacyGate {
        let snapshot = self.deployment.load();
        let canonical = snapshot
            .registry()
            .resolve_name(action)
            .map(str::to_string)
            .unwrap_or_else(|| canonicalize(action));

        let exclusions = snapshot.exclusions();
        if let Some(service) = exclusions.moved_to(&canonical) {
            LegacyGate::Moved {
                action: canonical,
                service: service.clone(),
            }
        } else if exclusions.is_retired(&canonical) {
            LegacyGate::Retired { action: canonical }
        } else if self.handlers.contains(&canonical) {
            LegacyGate::Execute { action: canonical }
        } else {
            LegacyGate::Unsupported {
                action: action.to_string(),
            }
        }
    }

    /// Run `action` if legacy still owns it; otherwise refuse without
    /// touching any handler.
    pub async fn execute(&self, action: &str, payload: Payload, context: CallerContext) -> ResponseEnvelope {
        match self.gate(action) {
            LegacyGate::Moved { action: canonical, service } => {
                log::warn!(
                    target: crate::contract::router::MIGRATION_LOG_TARGET,
                    "LegacyShim: refused '{}' (trace {}): moved to '{}'",
                    action,
                    context.trace_id,
                    service,
                );
                ResponseEnvelope::moved(&canonical, service)
            }
            LegacyGate::Retired { action: canonical } => {
                log::warn!(
                    target: crate::contract::router::MIGRATION_LOG_TARGET,
                    "LegacyShim: refused retired '{}' (trace {})",
                    action,
                    context.trace_id,
                );
                ResponseEnvelope::error(ErrorCode::Deprecated, format!("{} has been retired", canonical))
            }
            LegacyGate::Unsupported { action } => {
                log::debug!("LegacyShim: no handler for '{}'", action);
                ResponseEnvelope::error(ErrorCode::RouteNotFound, format!("unsupported action: {}", action))
            }
            LegacyGate::Execute { action: canonical } => {
                let Some(handler) = self.handlers.get(&canonical).cloned() else {
                    return ResponseEnvelope::error(
                        ErrorCode::RouteNotFound,
                        format!("unsupported action: {}", action),
                    );
                };
                log::debug!("LegacyShim: executing '{}'", canonical);
                let call = ActionCall {
                    action: canonical,
                    payload,
                    context,
                };
                normalize(handler(call).await.map(RawReply::Json))
            }
        }
    }
}

#[async_trait]
impl Service for LegacyShim {
    fn id(&self) -> &ServiceId {
        &self.id
    }

    async fn invoke(&self, request: RequestEnvelope) -> Result<RawReply, ServiceError> {
        let envelope = self
            .execute(&request.action, request.payload, request.caller_context)
            .await;
        Ok(RawReply::Envelope(envelope))
    }
}
