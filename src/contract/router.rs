//! Action router — the client-facing dispatcher.
//!
//! Instead of one `switch (event.action)` with seventy cases, the router
//! canonicalizes the action name once, looks it up in the live
//! [`ActionRegistry`](crate::registry::ActionRegistry) snapshot and forwards
//! the call to the owning [`Service`](super::service::Service). Anything the
//! registry does not know goes to the legacy service with the action name
//! untouched, so callers that predate the migration keep working.
//!
//! The router never returns an error and never lets a panic escape: every
//! outcome is a [`ResponseEnvelope`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use action_router::contract::{RawReply, RequestEnvelope, Router, Service, ServiceError, ServiceId, ServiceTable};
//! use action_router::registry::{DeploymentHandle, MigrationPlan};
//!
//! struct Echo(ServiceId);
//!
//! #[async_trait::async_trait]
//! impl Service for Echo {
//!     fn id(&self) -> &ServiceId { &self.0 }
//!     async fn invoke(&self, req: RequestEnvelope) -> Result<RawReply, ServiceError> {
//!         Ok(RawReply::Json(serde_json::json!({"handled_by": self.0.as_str(), "action": req.action})))
//!     }
//! }
//!
//! let plan = MigrationPlan::from_yaml(
//!     "legacy_service: legacy\nservices: [{id: health-death}]\n\
//!      actions: [{action: get_death_stats, service: health-death}]\n",
//! ).unwrap();
//! let services = ServiceTable::new()
//!     .with(Arc::new(Echo("legacy".into())))
//!     .with(Arc::new(Echo("health-death".into())));
//! let router = Router::new(DeploymentHandle::from_plan(&plan).unwrap(), services).unwrap();
//!
//! let reply = tokio_test::block_on(router.route(RequestEnvelope::with_json("getDeathStats", serde_json::json!({}))));
//! assert_eq!(reply.data().unwrap()["handled_by"], "health-death");
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;

use super::envelope::normalize;
use super::recorder::RouteRecorder;
use super::service::{ServiceError, ServiceTable};
use super::types::{ErrorCode, RequestEnvelope, ResponseEnvelope, ServiceId};
use crate::registry::{ActionStatus, Deployment, DeploymentHandle, MigrationPlan, PlanError};

/// Log target for routing decisions, kept apart from business logs.
pub const MIGRATION_LOG_TARGET: &str = "migration";

// ---------------------------------------------------------------------------
// RouteTarget
// ---------------------------------------------------------------------------

/// The routing decision for one action name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RouteTarget {
    /// The registry maps the action; `action` is canonical.
    Resolved { action: String, service: ServiceId },
    /// No mapping; legacy gets the original spelling.
    Legacy { action: String, service: ServiceId },
    /// Recognized but executed nowhere.
    Retired { action: String },
}

impl RouteTarget {
    pub fn action(&self) -> &str {
        match self {
            Self::Resolved { action, .. } | Self::Legacy { action, .. } | Self::Retired { action } => {
                action
            }
        }
    }

    pub fn service(&self) -> Option<&ServiceId> {
        match self {
            Self::Resolved { service, .. } | Self::Legacy { service, .. } => Some(service),
            Self::Retired { .. } => None,
        }
    }

    pub fn decision(&self) -> &'static str {
        match self {
            Self::Resolved { .. } => "resolved",
            Self::Legacy { .. } => "legacy",
            Self::Retired { .. } => "retired",
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Deadline for one downstream invocation. `None` waits forever.
    pub downstream_timeout: Option<Duration>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            downstream_timeout: Some(Duration::from_secs(10)),
        }
    }
}

/// Stateless dispatcher over the live deployment snapshot.
///
/// Cheap to clone; clones share the snapshot handle, the bound services and
/// the decision recorder.
#[derive(Clone)]
pub struct Router {
    deployment: DeploymentHandle,
    services: Arc<ServiceTable>,
    recorder: Arc<RouteRecorder>,
    config: RouterConfig,
}

impl Router {
    /// Create a router. Fails if any service the snapshot can route to has no
    /// bound handle.
    pub fn new(deployment: DeploymentHandle, services: ServiceTable) -> Result<Self, PlanError> {
        services.check_covers(deployment.load().registry())?;
        Ok(Self {
            deployment,
            services: Arc::new(services),
            recorder: Arc::new(RouteRecorder::new()),
            config: RouterConfig::default(),
        })
    }

    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn deployment(&self) -> &DeploymentHandle {
        &self.deployment
    }

    pub fn services(&self) -> &ServiceTable {
        &self.services
    }

    pub fn recorder(&self) -> &RouteRecorder {
        &self.recorder
    }

    /// The decision `route` would make for `action` right now. Invokes nothing.
    pub fn resolve(&self, action: &str) -> RouteTarget {
        Self::resolve_in(&self.deployment.load(), action)
    }

    fn resolve_in(deployment: &Deployment, action: &str) -> RouteTarget {
        match deployment.registry().lookup(action) {
            Some(d) if d.status == ActionStatus::Deprecated => RouteTarget::Retired {
                action: d.canonical_name.clone(),
            },
            Some(d) => RouteTarget::Resolved {
                action: d.canonical_name.clone(),
                service: d.target_service.clone(),
            },
            None => RouteTarget::Legacy {
                action: action.to_string(),
                service: deployment.legacy_service().clone(),
            },
        }
    }

    /// Route one request and return the owning service's envelope unchanged.
    ///
    /// A redirect coming back from legacy is passed through as-is; see
    /// [`route_following_redirect`](Self::route_following_redirect) for the
    /// opt-in re-dispatch.
    pub async fn route(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let snapshot = self.deployment.load();

        if request.action.trim().is_empty() {
            log::warn!(target: MIGRATION_LOG_TARGET, "Router: rejected request without action");
            return ResponseEnvelope::error(ErrorCode::ValidationError, "request has no action");
        }

        let target = Self::resolve_in(&snapshot, &request.action);

        if let RouteTarget::Resolved { action, .. } = &target {
            if let Some(descriptor) = snapshot.registry().lookup(action) {
                if let Err(problems) = descriptor.schema.validate(&request.payload) {
                    log::warn!(
                        target: MIGRATION_LOG_TARGET,
                        "Router: rejected '{}' before forwarding: {}",
                        request.action,
                        problems,
                    );
                    return ResponseEnvelope::error(
                        ErrorCode::ValidationError,
                        format!("{}: {}", action, problems),
                    );
                }
            }
        }

        self.recorder.record_decision(&target);

        match target {
            RouteTarget::Retired { action } => {
                log::info!(
                    target: MIGRATION_LOG_TARGET,
                    "Router: '{}' is retired (epoch {})",
                    request.action,
                    snapshot.epoch(),
                );
                ResponseEnvelope::error(
                    ErrorCode::Deprecated,
                    format!("{} has been retired", action),
                )
            }
            RouteTarget::Resolved { action, service } => {
                log::info!(
                    target: MIGRATION_LOG_TARGET,
                    "Router: '{}' -> '{}' (epoch {})",
                    request.action,
                    service,
                    snapshot.epoch(),
                );
                let forwarded = request.renamed(action);
                self.invoke(&service, forwarded).await
            }
            RouteTarget::Legacy { service, .. } => {
                log::info!(
                    target: MIGRATION_LOG_TARGET,
                    "Router: '{}' not mapped, falling through to legacy '{}' (epoch {})",
                    request.action,
                    service,
                    snapshot.epoch(),
                );
                self.invoke(&service, request).await
            }
        }
    }

    /// Like [`route`](Self::route), but when the reply is a redirect to a
    /// bound service, re-issue the call there once. The second reply is
    /// returned whatever it is.
    pub async fn route_following_redirect(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let first = self.route(request.clone()).await;
        let Some(service) = first.redirect_target().cloned() else {
            return first;
        };
        if !self.services.contains(service.as_str()) {
            return first;
        }

        let action = self
            .deployment
            .load()
            .registry()
            .resolve_name(&request.action)
            .map(str::to_string)
            .unwrap_or_else(|| request.action.clone());

        log::info!(
            target: MIGRATION_LOG_TARGET,
            "Router: following redirect for '{}' to '{}'",
            request.action,
            service,
        );
        self.invoke(&service, request.renamed(action)).await
    }

    /// Call one service directly, bypassing the registry. `None` if no such
    /// service is bound.
    pub async fn invoke_service(&self, service: &str, request: RequestEnvelope) -> Option<ResponseEnvelope> {
        let id = self.services.get(service)?.id().clone();
        Some(self.invoke(&id, request).await)
    }

    /// Validate and publish a new plan. The live snapshot is untouched when
    /// validation fails.
    pub fn publish(&self, plan: &MigrationPlan) -> Result<u64, PlanError> {
        let next = Deployment::build(plan)?;
        self.services.check_covers(next.registry())?;
        Ok(self.deployment.publish(next))
    }

    async fn invoke(&self, service: &ServiceId, request: RequestEnvelope) -> ResponseEnvelope {
        let Some(handle) = self.services.get(service.as_str()).cloned() else {
            log::error!("Router: no handle bound for service '{}'", service);
            return ResponseEnvelope::error(
                ErrorCode::ServiceUnavailable,
                format!("service '{}' is not available", service),
            );
        };

        let action = request.action.clone();
        let call = AssertUnwindSafe(handle.invoke(request)).catch_unwind();
        let outcome = match self.config.downstream_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(ServiceError::Timeout(limit))),
            },
            None => call.await,
        };

        let result = outcome.unwrap_or_else(|panic| Err(ServiceError::Panicked(panic_message(&*panic))));
        if let Err(e) = &result {
            log::warn!("Router: '{}' on '{}' failed: {}", action, service, e);
        }

        let envelope = normalize(result);
        log::debug!("Router: '{}' on '{}' returned {}", action, service, envelope.kind());
        self.recorder.record_outcome(service, &envelope);
        envelope
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("epoch", &self.deployment.epoch())
            .field("services", &self.services.ids())
            .field("config", &self.config)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
