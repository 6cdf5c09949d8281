//! Routing-decision counters.
//!
//! Separate from any business audit log: these answer "is anything still
//! falling through to legacy?" and "which services are failing?" while a
//! migration is in flight. Shared across request tasks without a global lock.

use dashmap::DashMap;
use serde::Serialize;

use super::router::RouteTarget;
use super::types::{ResponseEnvelope, ServiceId};

/// Aggregated count for one `(action, service, decision)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteStat {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceId>,
    /// `resolved`, `legacy` or `retired`.
    pub decision: &'static str,
    pub count: u64,
}

#[derive(Debug, Default)]
pub struct RouteRecorder {
    decisions: DashMap<(String, Option<ServiceId>, &'static str), u64>,
    /// Keyed by service and envelope kind (`ok`, `error`, `redirect`).
    outcomes: DashMap<(ServiceId, &'static str), u64>,
}

impl RouteRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decision(&self, target: &RouteTarget) {
        let key = (
            target.action().to_string(),
            target.service().cloned(),
            target.decision(),
        );
        *self.decisions.entry(key).or_insert(0) += 1;
    }

    pub fn record_outcome(&self, service: &ServiceId, envelope: &ResponseEnvelope) {
        *self
            .outcomes
            .entry((service.clone(), envelope.kind()))
            .or_insert(0) += 1;
    }

    /// All decision counters, sorted by action then decision.
    pub fn stats(&self) -> Vec<RouteStat> {
        let mut out: Vec<RouteStat> = self
            .decisions
            .iter()
            .map(|entry| {
                let (action, service, decision) = entry.key();
                RouteStat {
                    action: action.clone(),
                    service: service.clone(),
                    decision: *decision,
                    count: *entry.value(),
                }
            })
            .collect();
        out.sort_by(|a, b| {
            (a.action.as_str(), a.decision).cmp(&(b.action.as_str(), b.decision))
        });
        out
    }

    /// Decisions recorded for `action` (as it appeared in the decision).
    pub fn decisions_for(&self, action: &str) -> u64 {
        self.decisions
            .iter()
            .filter(|e| e.key().0 == action)
            .map(|e| *e.value())
            .sum()
    }

    /// How many calls fell through to legacy because nothing was mapped.
    pub fn fallthrough_total(&self) -> u64 {
        self.decisions
            .iter()
            .filter(|e| e.key().2 == "legacy")
            .map(|e| *e.value())
            .sum()
    }

    pub fn outcome_count(&self, service: &str, kind: &str) -> u64 {
        self.outcomes
            .iter()
            .filter(|e| e.key().0.as_str() == service && e.key().1 == kind)
            .map(|e| *e.value())
            .sum()
    }

    pub fn total(&self) -> u64 {
        self.decisions.iter().map(|e| *e.value()).sum()
    }
}
