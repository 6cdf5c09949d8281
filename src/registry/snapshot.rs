//! Deployment snapshots and atomic cutover.
//!
//! A [`Deployment`] holds the registry *and* the legacy shim's exclusion set,
//! both built from the same plan. They are published together through a
//! [`DeploymentHandle`], which swaps one `Arc` pointer. A request loads a
//! snapshot once and uses it for the whole call, so a concurrent cutover is
//! observed either entirely or not at all.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use super::action::MigrationState;
use super::error::PlanError;
use super::plan::{MigrationPlan, ServiceSpec};
use super::table::ActionRegistry;
use crate::contract::types::ServiceId;

// ---------------------------------------------------------------------------
// ExclusionSet
// ---------------------------------------------------------------------------

/// Actions legacy must not execute because another service owns them now.
///
/// Every member has a non-legacy owner. Retired actions are refused too, but
/// they are kept in a separate list: nobody owns them, so they are not
/// exclusions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExclusionSet {
    /// Migrated canonical action → its new owner.
    moved: HashMap<String, ServiceId>,
    retired: BTreeSet<String>,
}

impl ExclusionSet {
    /// Where a migrated action went.
    pub fn moved_to(&self, canonical: &str) -> Option<&ServiceId> {
        self.moved.get(canonical)
    }

    pub fn is_retired(&self, canonical: &str) -> bool {
        self.retired.contains(canonical)
    }

    /// True when `canonical` has moved to a non-legacy owner.
    pub fn contains(&self, canonical: &str) -> bool {
        self.moved.contains_key(canonical)
    }

    pub fn moved_actions(&self) -> BTreeSet<&str> {
        self.moved.keys().map(String::as_str).collect()
    }

    pub fn retired_actions(&self) -> &BTreeSet<String> {
        &self.retired
    }

    pub fn len(&self) -> usize {
        self.moved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moved.is_empty()
    }

    /// Derive the exclusions from `registry`, or check an explicit list
    /// against it. Both directions are enforced: nothing is excluded without
    /// a non-legacy owner, and nothing migrated is left executable in legacy.
    fn build(registry: &ActionRegistry, explicit: Option<&[String]>) -> Result<Self, PlanError> {
        let migrated = registry.actions_in(MigrationState::Migrated);
        let retired = registry.actions_in(MigrationState::Retired);

        let listed: BTreeSet<String> = match explicit {
            None => migrated.clone(),
            Some(names) => {
                let mut listed = BTreeSet::new();
                for name in names {
                    let canonical = registry
                        .resolve_name(name)
                        .filter(|c| migrated.contains(*c))
                        .ok_or_else(|| PlanError::ExclusionWithoutTarget(name.clone()))?;
                    listed.insert(canonical.to_string());
                }
                listed
            }
        };

        let mut moved = HashMap::with_capacity(listed.len());
        for action in &migrated {
            let Some(descriptor) = registry.lookup(action) else {
                continue;
            };
            if !listed.contains(action) {
                return Err(PlanError::MigratedNotExcluded {
                    action: action.clone(),
                    service: descriptor.target_service.clone(),
                });
            }
            moved.insert(action.clone(), descriptor.target_service.clone());
        }

        Ok(Self { moved, retired })
    }
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

/// One immutable routing snapshot.
#[derive(Debug, Clone)]
pub struct Deployment {
    epoch: u64,
    registry: ActionRegistry,
    exclusions: ExclusionSet,
    services: Vec<ServiceSpec>,
}

impl Deployment {
    /// Build and validate a snapshot from a plan.
    pub fn build(plan: &MigrationPlan) -> Result<Self, PlanError> {
        let registry = ActionRegistry::from_plan(plan)?;
        let exclusions = ExclusionSet::build(&registry, plan.legacy_exclusions.as_deref())?;

        log::info!(
            "Deployment: {} actions ({} migrated, {} retired), legacy '{}'",
            registry.len(),
            exclusions.moved.len(),
            exclusions.retired.len(),
            registry.legacy_service(),
        );

        Ok(Self {
            epoch: 0,
            registry,
            exclusions,
            services: plan.services.clone(),
        })
    }

    /// Monotonic publish counter; 0 for a snapshot never published.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    pub fn legacy_service(&self) -> &ServiceId {
        self.registry.legacy_service()
    }

    /// Non-legacy services declared by the plan.
    pub fn services(&self) -> &[ServiceSpec] {
        &self.services
    }
}

// ---------------------------------------------------------------------------
// DeploymentHandle
// ---------------------------------------------------------------------------

/// Shared, atomically swappable pointer to the live [`Deployment`].
///
/// Readers never block: `load()` is a lock-free pointer read. Publishers are
/// serialized so epochs stay strictly increasing.
#[derive(Clone)]
pub struct DeploymentHandle {
    current: Arc<ArcSwap<Deployment>>,
    publish_lock: Arc<Mutex<()>>,
}

impl DeploymentHandle {
    pub fn new(mut initial: Deployment) -> Self {
        initial.epoch = 1;
        Self {
            current: Arc::new(ArcSwap::from_pointee(initial)),
            publish_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_plan(plan: &MigrationPlan) -> Result<Self, PlanError> {
        Ok(Self::new(Deployment::build(plan)?))
    }

    /// The live snapshot. Hold on to it for the duration of one request.
    pub fn load(&self) -> Arc<Deployment> {
        self.current.load_full()
    }

    pub fn epoch(&self) -> u64 {
        self.current.load().epoch
    }

    /// Replace the live snapshot in one pointer swap. Returns the new epoch.
    pub fn publish(&self, mut next: Deployment) -> u64 {
        let _guard = self.publish_lock.lock();
        let epoch = self.current.load().epoch + 1;
        next.epoch = epoch;
        self.current.store(Arc::new(next));
        log::info!("DeploymentHandle: published epoch {}", epoch);
        epoch
    }
}

impl std::fmt::Debug for DeploymentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentHandle")
            .field("epoch", &self.epoch())
            .finish()
    }
}
