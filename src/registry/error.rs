//! Migration-plan errors. All of them are fatal at startup or on publish.

use thiserror::Error;

use crate::contract::types::ServiceId;

#[derive(Debug, Error)]
pub enum PlanError {
    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("migration plan contains an empty action name")]
    EmptyAction,

    #[error("service '{0}' is declared more than once")]
    DuplicateService(ServiceId),

    #[error("action '{0}' is listed more than once")]
    DuplicateAction(String),

    /// Two services claim the same canonical action.
    #[error("action '{action}' is claimed by both '{first}' and '{second}'")]
    DuplicateOwner {
        action: String,
        first: ServiceId,
        second: ServiceId,
    },

    #[error("alias '{alias}' resolves to both '{first}' and '{second}'")]
    AliasConflict {
        alias: String,
        first: String,
        second: String,
    },

    #[error("action '{action}' targets undeclared service '{service}'")]
    UnknownService { action: String, service: ServiceId },

    /// Legacy refuses an action that no other service executes.
    #[error("legacy exclusion '{0}' has no non-legacy target")]
    ExclusionWithoutTarget(String),

    /// Registry routes an action away while legacy would still execute it.
    #[error("action '{action}' is routed to '{service}' but legacy still executes it")]
    MigratedNotExcluded { action: String, service: ServiceId },

    #[error("no handle bound for service '{0}'")]
    UnboundService(ServiceId),

    /// The target is bound but was started without a handler for the action.
    #[error("service '{service}' has no handler for '{action}'")]
    MissingHandler { action: String, service: ServiceId },
}
