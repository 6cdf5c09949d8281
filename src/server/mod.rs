//! HTTP server in front of the action router.
//!
//! Exposes the router to clients that still speak the monolith's
//! `{action, payload}` protocol, plus a few endpoints for inspecting and
//! publishing the migration plan.
//!
//! # Endpoints
//!
//! - `GET  /health`              — Liveness probe
//! - `POST /invoke`              — Route one request
//! - `POST /services/:id/invoke` — Direct service call (stale callers)
//! - `GET  /routes`, `GET /routes/:action` — Registry inspection
//! - `GET  /stats`               — Routing decision counters
//! - `PUT  /deployment`          — Publish a new plan

pub mod routes;

pub use routes::{app_router, AppState};
