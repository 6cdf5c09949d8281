//! In-memory farm database.
//!
//! Documents are JSON objects kept per collection. Every successful insert or
//! update bumps the collection's write counter, which is how tests observe
//! that a refused call touched nothing.

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::contract::types::Payload;

/// One stored document. Always carries `_id` and `created_at`.
pub type Document = Payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    HealthRecords,
    TreatmentRecords,
    DeathRecords,
    PreventionRecords,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Self::HealthRecords,
        Self::TreatmentRecords,
        Self::DeathRecords,
        Self::PreventionRecords,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HealthRecords => "health_records",
            Self::TreatmentRecords => "treatment_records",
            Self::DeathRecords => "death_records",
            Self::PreventionRecords => "prevention_records",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{collection} has no document '{id}'")]
    NotFound { collection: Collection, id: String },

    #[error("document for {0} is not an object")]
    NotAnObject(Collection),
}

#[derive(Debug, Default)]
struct CollectionData {
    docs: Vec<Document>,
    writes: u64,
}

/// Thread-safe document store shared by every farm service.
#[derive(Debug, Default)]
pub struct FarmStore {
    collections: RwLock<HashMap<Collection, CollectionData>>,
}

impl FarmStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `doc`, assigning `_id` and `created_at`. Returns the new id.
    pub fn insert(&self, collection: Collection, mut doc: Document) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        doc.insert("_id".into(), Value::String(id.clone()));
        doc.entry("created_at")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

        let mut collections = self.collections.write();
        let data = collections.entry(collection).or_default();
        data.docs.push(doc);
        data.writes += 1;
        log::debug!("FarmStore: inserted {} into {}", id, collection);
        id
    }

    /// Merge `patch` into the document with `id` and return the result.
    pub fn update(&self, collection: Collection, id: &str, patch: Document) -> Result<Document, StoreError> {
        let mut collections = self.collections.write();
        let data = collections.entry(collection).or_default();
        let doc = data
            .docs
            .iter_mut()
            .find(|d| doc_id(d) == Some(id))
            .ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })?;

        for (key, value) in patch {
            if key != "_id" {
                doc.insert(key, value);
            }
        }
        doc.insert("updated_at".into(), Value::String(Utc::now().to_rfc3339()));
        data.writes += 1;
        Ok(doc.clone())
    }

    pub fn get(&self, collection: Collection, id: &str) -> Result<Document, StoreError> {
        self.collections
            .read()
            .get(&collection)
            .and_then(|data| data.docs.iter().find(|d| doc_id(d) == Some(id)).cloned())
            .ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })
    }

    /// Documents in insertion order that satisfy `filter`.
    pub fn find(&self, collection: Collection, filter: impl Fn(&Document) -> bool) -> Vec<Document> {
        self.collections
            .read()
            .get(&collection)
            .map(|data| data.docs.iter().filter(|d| filter(d)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .get(&collection)
            .map_or(0, |data| data.docs.len())
    }

    /// Successful inserts plus updates so far.
    pub fn write_count(&self, collection: Collection) -> u64 {
        self.collections
            .read()
            .get(&collection)
            .map_or(0, |data| data.writes)
    }

    pub fn total_writes(&self) -> u64 {
        self.collections.read().values().map(|data| data.writes).sum()
    }
}

/// Turn a serializable record into a storable document.
pub fn to_document<T: Serialize>(collection: Collection, record: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(StoreError::NotAnObject(collection)),
    }
}

pub fn doc_id(doc: &Document) -> Option<&str> {
    doc.get("_id").and_then(Value::as_str)
}

pub fn doc_str<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    doc.get(field).and_then(Value::as_str)
}
