//! Permission and audit collaborators the farm services call into.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

/// Decides whether a caller may perform `action` in `module`.
pub trait PermissionChecker: Send + Sync {
    fn check_permission(&self, identity: &str, module: &str, action: &str) -> bool;
}

/// Grants everything. The default for local development.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionChecker for AllowAll {
    fn check_permission(&self, _identity: &str, _module: &str, _action: &str) -> bool {
        true
    }
}

/// Explicit grants per identity, as `module:action` strings. `*` matches any
/// module or action.
#[derive(Debug, Clone, Default)]
pub struct RolePermissions {
    grants: HashMap<String, BTreeSet<String>>,
}

impl RolePermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, identity: &str, module: &str, action: &str) -> Self {
        self.grants
            .entry(identity.to_string())
            .or_default()
            .insert(format!("{}:{}", module, action));
        self
    }
}

impl PermissionChecker for RolePermissions {
    fn check_permission(&self, identity: &str, module: &str, action: &str) -> bool {
        let Some(granted) = self.grants.get(identity) else {
            return false;
        };
        [
            format!("{}:{}", module, action),
            format!("{}:*", module),
            "*:*".to_string(),
        ]
        .iter()
        .any(|key| granted.contains(key))
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Records successful mutations.
pub trait AuditLog: Send + Sync {
    fn write_audit_log(&self, identity: &str, action: &str, collection: &str, details: Value);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub identity: String,
    pub action: String,
    pub collection: String,
    pub details: Value,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditLog for MemoryAuditLog {
    fn write_audit_log(&self, identity: &str, action: &str, collection: &str, details: Value) {
        log::debug!("audit: {} {} on {}", identity, action, collection);
        self.entries.lock().push(AuditEntry {
            identity: identity.to_string(),
            action: action.to_string(),
            collection: collection.to_string(),
            details,
            at: Utc::now(),
        });
    }
}
