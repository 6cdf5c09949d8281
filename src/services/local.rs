//! In-process services backed by a data-driven action table.
//!
//! [`ActionTable`] replaces the monolith's action switch: each canonical
//! action maps to one async handler. The same table type backs the legacy
//! shim and every decomposed service that runs in process.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::contract::envelope::RawReply;
use crate::contract::service::{Service, ServiceError};
use crate::contract::types::{CallerContext, Payload, RequestEnvelope, ServiceId};
use crate::registry::canonicalize;

/// Arguments handed to an action handler.
#[derive(Debug, Clone)]
pub struct ActionCall {
    /// Canonical action name.
    pub action: String,
    pub payload: Payload,
    pub context: CallerContext,
}

pub type HandlerResult = Result<Value, ServiceError>;

/// Type-erased async action handler.
pub type ActionHandler = Arc<dyn Fn(ActionCall) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Canonical action name → handler.
#[derive(Clone, Default)]
pub struct ActionTable {
    handlers: HashMap<String, ActionHandler>,
}

impl ActionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under the canonical form of `action`.
    pub fn register<F, Fut>(&mut self, action: &str, handler: F)
    where
        F: Fn(ActionCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: ActionHandler =
            Arc::new(move |call: ActionCall| -> BoxFuture<'static, HandlerResult> { Box::pin(handler(call)) });
        self.handlers.insert(canonicalize(action), handler);
    }

    pub fn with<F, Fut>(mut self, action: &str, handler: F) -> Self
    where
        F: Fn(ActionCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(action, handler);
        self
    }

    pub fn get(&self, action: &str) -> Option<&ActionHandler> {
        self.handlers.get(&canonicalize(action))
    }

    pub fn contains(&self, action: &str) -> bool {
        self.get(action).is_some()
    }

    pub fn actions(&self) -> BTreeSet<String> {
        self.handlers.keys().cloned().collect()
    }

    /// A table holding only the listed actions (the ones a split-off service
    /// takes with it).
    pub fn subset<'a>(&self, actions: impl IntoIterator<Item = &'a str>) -> Self {
        let handlers = actions
            .into_iter()
            .filter_map(|a| {
                let key = canonicalize(a);
                self.handlers.get(&key).map(|h| (key, Arc::clone(h)))
            })
            .collect();
        Self { handlers }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for ActionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionTable")
            .field("actions", &self.actions())
            .finish()
    }
}

/// A service running in this process over its own [`ActionTable`].
pub struct LocalService {
    id: ServiceId,
    table: ActionTable,
}

impl LocalService {
    pub fn new(id: impl Into<ServiceId>, table: ActionTable) -> Self {
        Self {
            id: id.into(),
            table,
        }
    }

    pub fn actions(&self) -> BTreeSet<String> {
        self.table.actions()
    }
}

#[async_trait]
impl Service for LocalService {
    fn id(&self) -> &ServiceId {
        &self.id
    }

    fn can_execute(&self, action: &str) -> Option<bool> {
        Some(self.table.contains(action))
    }

    async fn invoke(&self, request: RequestEnvelope) -> Result<RawReply, ServiceError> {
        let handler = self
            .table
            .get(&request.action)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownAction(request.action.clone()))?;

        let call = ActionCall {
            action: canonicalize(&request.action),
            payload: request.payload,
            context: request.caller_context,
        };
        handler(call).await.map(RawReply::Json)
    }
}
