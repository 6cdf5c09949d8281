//! Migration plan: the static configuration both the registry and the legacy
//! exclusion set are built from.
//!
//! ```yaml
//! legacy_service: farm-legacy
//! services:
//!   - id: health-death
//!     endpoint: http://health-death.internal/invoke   # optional
//! actions:
//!   - action: get_death_stats
//!     service: health-death
//!     aliases: [death_statistics]
//!     payload: { farm_id: string }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::PlanError;
use super::schema::PayloadSchema;
use crate::contract::types::ServiceId;

/// Plan shipped with the crate, used when no plan file is configured.
pub const DEFAULT_PLAN: &str = include_str!("../../config/migration_plan.yaml");

/// A deployable service declared by the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub id: ServiceId,
    /// HTTP endpoint for services running out of process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// One `(alias*, action, service)` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRow {
    pub action: String,
    pub service: ServiceId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "PayloadSchema::is_empty")]
    pub payload: PayloadSchema,
    /// Retired actions are recognized but executed nowhere.
    #[serde(default)]
    pub retired: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// The monolith that still serves every unmigrated action.
    pub legacy_service: ServiceId,
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
    #[serde(default)]
    pub actions: Vec<PlanRow>,
    /// Actions the legacy shim refuses. Derived from `actions` when absent;
    /// when present it must agree with them exactly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_exclusions: Option<Vec<String>>,
}

impl MigrationPlan {
    pub fn from_yaml(yaml: &str) -> Result<Self, PlanError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        log::info!("MigrationPlan: loading {}", path.as_ref().display());
        Self::from_yaml(&content)
    }

    /// The plan embedded at build time.
    pub fn builtin() -> Result<Self, PlanError> {
        Self::from_yaml(DEFAULT_PLAN)
    }

    pub fn to_yaml(&self) -> Result<String, PlanError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Declared service ids, legacy included.
    pub fn declared_services(&self) -> impl Iterator<Item = &ServiceId> {
        std::iter::once(&self.legacy_service).chain(self.services.iter().map(|s| &s.id))
    }

    pub fn service(&self, id: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.id.as_str() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_plan_parses() {
        let plan = MigrationPlan::builtin().unwrap();
        assert_eq!(plan.legacy_service.as_str(), "farm-legacy");
        assert!(plan.actions.iter().any(|r| r.action == "create_health_record"));
        assert!(plan
            .actions
            .iter()
            .any(|r| r.action == "fix_diagnosis_treatment_status"
                && r.service.as_str() == "farm-legacy"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "legacy_service: legacy\nactions:\n  - action: a\n    service: legacy\n"
        )
        .unwrap();

        let plan = MigrationPlan::from_file(file.path()).unwrap();
        assert_eq!(plan.actions.len(), 1);
        assert!(plan.services.is_empty());
        assert!(plan.legacy_exclusions.is_none());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = MigrationPlan::from_file("/nonexistent/plan.yaml").unwrap_err();
        assert!(matches!(err, PlanError::Io(_)));
    }

    #[test]
    fn test_malformed_yaml_is_yaml_error() {
        let err = MigrationPlan::from_yaml("actions: [").unwrap_err();
        assert!(matches!(err, PlanError::Yaml(_)));
    }

    #[test]
    fn test_yaml_round_trip_keeps_rows() {
        let plan = MigrationPlan::builtin().unwrap();
        let again = MigrationPlan::from_yaml(&plan.to_yaml().unwrap()).unwrap();
        assert_eq!(plan, again);
    }

    #[test]
    fn test_declared_services_include_legacy() {
        let plan = MigrationPlan::builtin().unwrap();
        let ids: Vec<&str> = plan.declared_services().map(|s| s.as_str()).collect();
        assert_eq!(ids[0], "farm-legacy");
        assert!(ids.contains(&"health-death"));
    }
}
