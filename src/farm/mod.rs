//! Reference farm backend: an in-memory store, permission and audit
//! collaborators, and the health-management actions that run on top.

pub mod actions;
pub mod catalog;
pub mod collaborators;
pub mod store;

pub use actions::{FarmAction, FarmContext, FARM_ACTIONS, MODULE};
pub use catalog::{action_table, bind_services, build_router, BootError};
pub use collaborators::{AllowAll, AuditEntry, AuditLog, MemoryAuditLog, PermissionChecker, RolePermissions};
pub use store::{Collection, Document, FarmStore, StoreError};
