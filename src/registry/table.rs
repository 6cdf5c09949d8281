//! Immutable action → service table.
//!
//! Built once from a [`MigrationPlan`] and never mutated. Lookups
//! canonicalize the requested name, resolve aliases, and hit a `HashMap`:
//! one string normalization, then O(1).

use std::collections::{BTreeSet, HashMap, HashSet};

use super::action::{canonicalize, ActionDescriptor, ActionStatus, MigrationState};
use super::error::PlanError;
use super::plan::MigrationPlan;
use crate::contract::types::ServiceId;

#[derive(Debug, Clone)]
pub struct ActionRegistry {
    /// Descriptors keyed by canonical name.
    descriptors: HashMap<String, ActionDescriptor>,
    /// Canonicalized alias → canonical name.
    aliases: HashMap<String, String>,
    legacy: ServiceId,
}

impl ActionRegistry {
    /// Build and validate a registry. Any inconsistency is an error here,
    /// never at request time.
    pub fn from_plan(plan: &MigrationPlan) -> Result<Self, PlanError> {
        let mut declared: HashSet<&ServiceId> = HashSet::new();
        for id in plan.declared_services() {
            if !declared.insert(id) {
                return Err(PlanError::DuplicateService(id.clone()));
            }
        }

        let mut descriptors: HashMap<String, ActionDescriptor> = HashMap::new();
        for row in &plan.actions {
            let canonical = canonicalize(&row.action);
            if canonical.is_empty() {
                return Err(PlanError::EmptyAction);
            }
            if !declared.contains(&row.service) {
                return Err(PlanError::UnknownService {
                    action: canonical,
                    service: row.service.clone(),
                });
            }
            if let Some(existing) = descriptors.get(&canonical) {
                return Err(if existing.target_service == row.service {
                    PlanError::DuplicateAction(canonical)
                } else {
                    PlanError::DuplicateOwner {
                        action: canonical,
                        first: existing.target_service.clone(),
                        second: row.service.clone(),
                    }
                });
            }

            let aliases: BTreeSet<String> = row
                .aliases
                .iter()
                .map(|a| canonicalize(a))
                .filter(|a| !a.is_empty() && *a != canonical)
                .collect();

            descriptors.insert(
                canonical.clone(),
                ActionDescriptor {
                    canonical_name: canonical,
                    aliases,
                    target_service: row.service.clone(),
                    status: if row.retired {
                        ActionStatus::Deprecated
                    } else {
                        ActionStatus::Active
                    },
                    schema: row.payload.clone(),
                },
            );
        }

        // Aliases are indexed after every canonical name is known so that an
        // alias shadowing a later row is still caught.
        let mut aliases: HashMap<String, String> = HashMap::new();
        for descriptor in descriptors.values() {
            for alias in &descriptor.aliases {
                if descriptors.contains_key(alias) {
                    return Err(PlanError::AliasConflict {
                        alias: alias.clone(),
                        first: alias.clone(),
                        second: descriptor.canonical_name.clone(),
                    });
                }
                if let Some(first) = aliases.get(alias) {
                    return Err(PlanError::AliasConflict {
                        alias: alias.clone(),
                        first: first.clone(),
                        second: descriptor.canonical_name.clone(),
                    });
                }
                aliases.insert(alias.clone(), descriptor.canonical_name.clone());
            }
        }

        log::debug!(
            "ActionRegistry: built {} actions, {} aliases, legacy '{}'",
            descriptors.len(),
            aliases.len(),
            plan.legacy_service,
        );

        Ok(Self {
            descriptors,
            aliases,
            legacy: plan.legacy_service.clone(),
        })
    }

    /// Canonical name `name` resolves to, if the registry knows it.
    pub fn resolve_name(&self, name: &str) -> Option<&str> {
        let canonical = canonicalize(name);
        if let Some(descriptor) = self.descriptors.get(&canonical) {
            return Some(&descriptor.canonical_name);
        }
        self.aliases.get(&canonical).map(String::as_str)
    }

    /// Look up an action by any spelling. `None` means the registry has no
    /// mapping; the caller decides the fallback.
    pub fn lookup(&self, name: &str) -> Option<&ActionDescriptor> {
        let canonical = self.resolve_name(name)?;
        self.descriptors.get(canonical)
    }

    pub fn migration_state(&self, name: &str) -> Option<MigrationState> {
        self.lookup(name).map(|d| d.migration_state(&self.legacy))
    }

    pub fn legacy_service(&self) -> &ServiceId {
        &self.legacy
    }

    /// All descriptors, sorted by canonical name.
    pub fn descriptors(&self) -> Vec<&ActionDescriptor> {
        let mut out: Vec<&ActionDescriptor> = self.descriptors.values().collect();
        out.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));
        out
    }

    /// Canonical actions currently assigned to `service`.
    pub fn actions_for(&self, service: &str) -> BTreeSet<String> {
        self.descriptors
            .values()
            .filter(|d| d.target_service.as_str() == service)
            .map(|d| d.canonical_name.clone())
            .collect()
    }

    /// Canonical actions in the given migration state.
    pub fn actions_in(&self, state: MigrationState) -> BTreeSet<String> {
        self.descriptors
            .values()
            .filter(|d| d.migration_state(&self.legacy) == state)
            .map(|d| d.canonical_name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
