//! Health-management actions.
//!
//! Each action decodes its payload into a typed request, checks the caller's
//! permission, touches the [`FarmStore`] and audits successful mutations.
//! The same functions back the decomposed services and the legacy monolith;
//! which one runs them is decided by the migration plan, not here.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::collaborators::{AllowAll, AuditLog, MemoryAuditLog, PermissionChecker};
use super::store::{doc_id, doc_str, to_document, Collection, Document, FarmStore, StoreError};
use crate::contract::service::ServiceError;
use crate::services::{ActionCall, HandlerResult};

/// Permission module every health action is checked against.
pub const MODULE: &str = "health";

pub type FarmAction = fn(&FarmContext, ActionCall) -> HandlerResult;

/// Every farm action under its canonical name.
pub const FARM_ACTIONS: &[(&str, FarmAction)] = &[
    ("create_health_record", create_health_record),
    ("list_health_records", list_health_records),
    ("create_treatment_record", create_treatment_record),
    ("complete_treatment", complete_treatment),
    ("create_death_record", create_death_record),
    ("get_death_stats", get_death_stats),
    ("create_prevention_record", create_prevention_record),
    ("get_overview_stats", get_overview_stats),
    ("calculate_treatment_cost", calculate_treatment_cost),
    ("fix_diagnosis_treatment_status", fix_diagnosis_treatment_status),
];

/// Shared collaborators handed to every action.
#[derive(Clone)]
pub struct FarmContext {
    pub store: Arc<FarmStore>,
    pub permissions: Arc<dyn PermissionChecker>,
    pub audit: Arc<dyn AuditLog>,
}

impl FarmContext {
    pub fn new(
        store: Arc<FarmStore>,
        permissions: Arc<dyn PermissionChecker>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            store,
            permissions,
            audit,
        }
    }

    /// Empty store, everything allowed, audit kept in memory.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(FarmStore::new()),
            Arc::new(AllowAll),
            Arc::new(MemoryAuditLog::new()),
        )
    }

    fn authorize(&self, call: &ActionCall, operation: &str) -> Result<(), ServiceError> {
        let identity = call.context.identity_or_anonymous();
        if self.permissions.check_permission(identity, MODULE, operation) {
            Ok(())
        } else {
            log::warn!("{} may not {} {} ({})", identity, operation, MODULE, call.action);
            Err(ServiceError::PermissionDenied(format!(
                "{} may not {} {}",
                identity, operation, MODULE
            )))
        }
    }

    fn audit(&self, call: &ActionCall, collection: Collection, details: Value) {
        self.audit.write_audit_log(
            call.context.identity_or_anonymous(),
            &call.action,
            collection.as_str(),
            details,
        );
    }
}

impl std::fmt::Debug for FarmContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FarmContext").field("store", &self.store).finish()
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => ServiceError::Rejected(e.to_string()),
            StoreError::NotAnObject(_) => ServiceError::Failed(e.to_string()),
        }
    }
}

fn decode<T: DeserializeOwned>(call: &ActionCall) -> Result<T, ServiceError> {
    serde_json::from_value(Value::Object(call.payload.clone()))
        .map_err(|e| ServiceError::Validation(format!("{}: {}", call.action, e)))
}

fn set(field: &str, value: Value) -> Document {
    let mut doc = Document::new();
    doc.insert(field.to_string(), value);
    doc
}

// ---------------------------------------------------------------------------
// Health status values
// ---------------------------------------------------------------------------

const OPEN: &str = "open";
const TREATING: &str = "treating";
const RECOVERED: &str = "recovered";
const DEAD: &str = "dead";

const ONGOING: &str = "ongoing";
const COMPLETED: &str = "completed";

// ---------------------------------------------------------------------------
// Health records
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateHealthRecord {
    pub animal_id: String,
    pub diagnosis: String,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

pub fn create_health_record(ctx: &FarmContext, call: ActionCall) -> HandlerResult {
    ctx.authorize(&call, "write")?;
    let req: CreateHealthRecord = decode(&call)?;

    let mut doc = to_document(Collection::HealthRecords, &req)?;
    doc.insert("status".into(), json!(OPEN));
    let id = ctx.store.insert(Collection::HealthRecords, doc);

    ctx.audit(&call, Collection::HealthRecords, json!({"_id": id, "animal_id": req.animal_id}));
    Ok(json!({"_id": id, "status": OPEN}))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListHealthRecords {
    pub animal_id: Option<String>,
    pub status: Option<String>,
}

pub fn list_health_records(ctx: &FarmContext, call: ActionCall) -> HandlerResult {
    ctx.authorize(&call, "read")?;
    let req: ListHealthRecords = decode(&call)?;

    let records = ctx.store.find(Collection::HealthRecords, |d| {
        req.animal_id.as_deref().map_or(true, |a| doc_str(d, "animal_id") == Some(a))
            && req.status.as_deref().map_or(true, |s| doc_str(d, "status") == Some(s))
    });
    Ok(json!({"total": records.len(), "records": records}))
}

// ---------------------------------------------------------------------------
// Treatments
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTreatmentRecord {
    pub animal_id: String,
    pub medication: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dosage: Option<String>,
    #[serde(default)]
    pub cost: f64,
}

pub fn create_treatment_record(ctx: &FarmContext, call: ActionCall) -> HandlerResult {
    ctx.authorize(&call, "write")?;
    let req: CreateTreatmentRecord = decode(&call)?;
    if req.cost < 0.0 {
        return Err(ServiceError::Validation("cost must not be negative".into()));
    }
    if let Some(record) = &req.health_record_id {
        ctx.store.get(Collection::HealthRecords, record)?;
    }

    let mut doc = to_document(Collection::TreatmentRecords, &req)?;
    doc.insert("status".into(), json!(ONGOING));
    let id = ctx.store.insert(Collection::TreatmentRecords, doc);

    if let Some(record) = &req.health_record_id {
        ctx.store
            .update(Collection::HealthRecords, record, set("status", json!(TREATING)))?;
    }

    ctx.audit(&call, Collection::TreatmentRecords, json!({"_id": id, "animal_id": req.animal_id}));
    Ok(json!({"_id": id, "status": ONGOING}))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentOutcome {
    Cured,
    Died,
    Ineffective,
}

#[derive(Debug, Deserialize)]
pub struct CompleteTreatment {
    pub treatment_id: String,
    pub outcome: TreatmentOutcome,
}

pub fn complete_treatment(ctx: &FarmContext, call: ActionCall) -> HandlerResult {
    ctx.authorize(&call, "write")?;
    let req: CompleteTreatment = decode(&call)?;

    let treatment = ctx.store.get(Collection::TreatmentRecords, &req.treatment_id)?;
    if doc_str(&treatment, "status") == Some(COMPLETED) {
        return Err(ServiceError::Rejected(format!(
            "treatment {} is already completed",
            req.treatment_id
        )));
    }

    let mut patch = set("status", json!(COMPLETED));
    patch.insert("outcome".into(), json!(req.outcome));
    let updated = ctx
        .store
        .update(Collection::TreatmentRecords, &req.treatment_id, patch)?;

    let record_status = match req.outcome {
        TreatmentOutcome::Cured => Some(RECOVERED),
        TreatmentOutcome::Died => Some(DEAD),
        TreatmentOutcome::Ineffective => None,
    };
    if let (Some(status), Some(record)) = (record_status, doc_str(&treatment, "health_record_id")) {
        ctx.store
            .update(Collection::HealthRecords, record, set("status", json!(status)))?;
    }

    ctx.audit(
        &call,
        Collection::TreatmentRecords,
        json!({"_id": req.treatment_id, "outcome": req.outcome}),
    );
    Ok(Value::Object(updated))
}

#[derive(Debug, Default, Deserialize)]
pub struct CalculateTreatmentCost {
    pub treatment_id: Option<String>,
    pub animal_id: Option<String>,
}

pub fn calculate_treatment_cost(ctx: &FarmContext, call: ActionCall) -> HandlerResult {
    ctx.authorize(&call, "read")?;
    let req: CalculateTreatmentCost = decode(&call)?;

    if let Some(id) = &req.treatment_id {
        ctx.store.get(Collection::TreatmentRecords, id)?;
    }
    let treatments = ctx.store.find(Collection::TreatmentRecords, |d| {
        req.treatment_id.as_deref().map_or(true, |t| doc_id(d) == Some(t))
            && req.animal_id.as_deref().map_or(true, |a| doc_str(d, "animal_id") == Some(a))
    });
    let total: f64 = treatments
        .iter()
        .filter_map(|d| d.get("cost").and_then(Value::as_f64))
        .sum();

    Ok(json!({"total_cost": total, "treatments": treatments.len()}))
}

// ---------------------------------------------------------------------------
// Deaths
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateDeathRecord {
    pub animal_id: String,
    pub cause: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_record_id: Option<String>,
}

pub fn create_death_record(ctx: &FarmContext, call: ActionCall) -> HandlerResult {
    ctx.authorize(&call, "write")?;
    let req: CreateDeathRecord = decode(&call)?;
    if let Some(record) = &req.health_record_id {
        ctx.store.get(Collection::HealthRecords, record)?;
    }

    let doc = to_document(Collection::DeathRecords, &req)?;
    let id = ctx.store.insert(Collection::DeathRecords, doc);
    if let Some(record) = &req.health_record_id {
        ctx.store
            .update(Collection::HealthRecords, record, set("status", json!(DEAD)))?;
    }

    ctx.audit(&call, Collection::DeathRecords, json!({"_id": id, "cause": req.cause}));
    Ok(json!({"_id": id}))
}

pub fn get_death_stats(ctx: &FarmContext, call: ActionCall) -> HandlerResult {
    ctx.authorize(&call, "read")?;

    let deaths = ctx.store.find(Collection::DeathRecords, |_| true);
    let mut by_cause: BTreeMap<String, u64> = BTreeMap::new();
    for death in &deaths {
        let cause = doc_str(death, "cause").unwrap_or("unknown");
        *by_cause.entry(cause.to_string()).or_default() += 1;
    }
    Ok(json!({"total": deaths.len(), "by_cause": by_cause}))
}

// ---------------------------------------------------------------------------
// Prevention
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePreventionRecord {
    pub vaccine: String,
    #[serde(default)]
    pub animal_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administered_at: Option<String>,
}

pub fn create_prevention_record(ctx: &FarmContext, call: ActionCall) -> HandlerResult {
    ctx.authorize(&call, "write")?;
    let req: CreatePreventionRecord = decode(&call)?;

    let doc = to_document(Collection::PreventionRecords, &req)?;
    let id = ctx.store.insert(Collection::PreventionRecords, doc);

    ctx.audit(
        &call,
        Collection::PreventionRecords,
        json!({"_id": id, "vaccine": req.vaccine, "animals": req.animal_ids.len()}),
    );
    Ok(json!({"_id": id}))
}

// ---------------------------------------------------------------------------
// Overview
// ---------------------------------------------------------------------------

pub fn get_overview_stats(ctx: &FarmContext, call: ActionCall) -> HandlerResult {
    ctx.authorize(&call, "read")?;
    let store = &ctx.store;

    let open_cases = store
        .find(Collection::HealthRecords, |d| {
            matches!(doc_str(d, "status"), Some(OPEN) | Some(TREATING))
        })
        .len();
    let ongoing = store
        .find(Collection::TreatmentRecords, |d| doc_str(d, "status") == Some(ONGOING))
        .len();

    Ok(json!({
        "health_records": store.count(Collection::HealthRecords),
        "open_cases": open_cases,
        "treatments_ongoing": ongoing,
        "deaths": store.count(Collection::DeathRecords),
        "preventions": store.count(Collection::PreventionRecords),
    }))
}

// ---------------------------------------------------------------------------
// Repair
// ---------------------------------------------------------------------------

/// Reconcile health-record status with the treatments attached to it.
///
/// An `open` record with an ongoing treatment becomes `treating`; a
/// `treating` record whose treatments are all completed takes the outcome of
/// the most recent one.
pub fn fix_diagnosis_treatment_status(ctx: &FarmContext, call: ActionCall) -> HandlerResult {
    ctx.authorize(&call, "write")?;
    let store = &ctx.store;

    let mut fixed = Vec::new();
    for record in store.find(Collection::HealthRecords, |_| true) {
        let Some(id) = doc_id(&record) else { continue };
        let treatments =
            store.find(Collection::TreatmentRecords, |t| doc_str(t, "health_record_id") == Some(id));
        if treatments.is_empty() {
            continue;
        }

        let any_ongoing = treatments.iter().any(|t| doc_str(t, "status") == Some(ONGOING));
        let wanted = match doc_str(&record, "status") {
            Some(OPEN) if any_ongoing => Some(TREATING),
            Some(TREATING) if !any_ongoing => match treatments.last().and_then(|t| doc_str(t, "outcome")) {
                Some("cured") => Some(RECOVERED),
                Some("died") => Some(DEAD),
                _ => None,
            },
            _ => None,
        };

        if let Some(status) = wanted {
            store.update(Collection::HealthRecords, id, set("status", json!(status)))?;
            fixed.push(json!({"_id": id, "status": status}));
        }
    }

    if !fixed.is_empty() {
        ctx.audit(&call, Collection::HealthRecords, json!({"fixed": fixed.len()}));
    }
    Ok(json!({"fixed": fixed.len(), "records": fixed}))
}
