//! Invocation contract shared by the router, the legacy shim and services.
//!
//! # Modules
//!
//! - [`types`] — `RequestEnvelope`, `ResponseEnvelope`, `ServiceId`, `ErrorCode`
//! - [`envelope`] — normalization of heterogeneous service replies
//! - [`service`] — the `Service` trait, `ServiceError`, `ServiceTable`
//! - [`router`] — the client-facing dispatcher
//! - [`recorder`] — routing-decision counters for migration observability

pub mod envelope;
pub mod recorder;
pub mod router;
pub mod service;
pub mod types;

pub use envelope::{normalize, normalize_json, RawReply};
pub use recorder::{RouteRecorder, RouteStat};
pub use router::{RouteTarget, Router, RouterConfig};
pub use service::{Service, ServiceDescriptor, ServiceError, ServiceTable};
pub use types::*;
