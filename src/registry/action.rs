//! Action names and descriptors.

use std::collections::BTreeSet;

use serde::Serialize;

use super::schema::PayloadSchema;
use crate::contract::types::ServiceId;

/// Canonical form of an action name.
///
/// camelCase and PascalCase boundaries become `_`, separators (`-`, `.`,
/// whitespace) become `_`, repeated underscores collapse and the result is
/// lowercased, so `getDeathStats`, `get-death-stats` and `get_death_stats`
/// are the same action.
pub fn canonicalize(name: &str) -> String {
    let chars: Vec<char> = name.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == '.' || c == '_' || c.is_whitespace() {
            push_separator(&mut out);
            continue;
        }
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.map_or(false, char::is_lowercase),
                _ => false,
            };
            if boundary {
                push_separator(&mut out);
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}

fn push_separator(out: &mut String) {
    if !out.is_empty() && !out.ends_with('_') {
        out.push('_');
    }
}

/// Whether an action is still served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Active,
    /// Retired: recognized, never executed anywhere.
    Deprecated,
}

/// Where an action stands in the migration, derived from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    LegacyOnly,
    Migrated,
    Retired,
}

/// One row of the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionDescriptor {
    pub canonical_name: String,
    pub aliases: BTreeSet<String>,
    pub target_service: ServiceId,
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "PayloadSchema::is_empty")]
    pub schema: PayloadSchema,
}

impl ActionDescriptor {
    /// Migration state relative to the deployment's legacy service.
    pub fn migration_state(&self, legacy: &ServiceId) -> MigrationState {
        match self.status {
            ActionStatus::Deprecated => MigrationState::Retired,
            ActionStatus::Active if &self.target_service == legacy => MigrationState::LegacyOnly,
            ActionStatus::Active => MigrationState::Migrated,
        }
    }
}
