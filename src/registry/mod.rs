//! Action registry — which service executes which action.
//!
//! # Architecture
//!
//! ```text
//! migration_plan.yaml
//!   ↓  MigrationPlan::from_file()
//! MigrationPlan (rows: alias*, action, service)
//!   ↓  Deployment::build()        — validates, fails fast
//! Deployment { ActionRegistry, ExclusionSet }
//!   ↓  DeploymentHandle::publish() — one atomic pointer swap
//! Router + LegacyShim read the same snapshot
//! ```

pub mod action;
pub mod error;
pub mod plan;
pub mod schema;
pub mod snapshot;
pub mod table;

pub use action::{canonicalize, ActionDescriptor, ActionStatus, MigrationState};
pub use error::PlanError;
pub use plan::{MigrationPlan, PlanRow, ServiceSpec, DEFAULT_PLAN};
pub use schema::{FieldKind, PayloadSchema};
pub use snapshot::{Deployment, DeploymentHandle, ExclusionSet};
pub use table::ActionRegistry;
