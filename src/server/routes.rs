//! Axum route handlers for the action-router HTTP server.
//!
//! # Routes
//!
//! - `GET  /health`               — Returns `{"status": "ok", "version": ..., "epoch": ...}`
//! - `POST /invoke`               — `RequestEnvelope` in, `ResponseEnvelope` out
//! - `POST /services/:id/invoke`  — Invoke one service directly, bypassing the registry
//! - `GET  /routes`               — Registry listing with migration state per action
//! - `GET  /routes/:action`       — Routing decision for one action name
//! - `GET  /stats`                — Routing decision counters
//! - `PUT  /deployment`           — Publish a new migration plan (YAML body)

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::contract::types::{ErrorCode, RequestEnvelope, ResponseEnvelope};
use crate::contract::Router as ActionRouter;
use crate::registry::MigrationPlan;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub router: ActionRouter,
}

impl AppState {
    pub fn new(router: ActionRouter) -> Self {
        Self { router }
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/invoke", post(invoke_handler))
        .route("/services/:id/invoke", post(service_invoke_handler))
        .route("/routes", get(list_routes_handler))
        .route("/routes/:action", get(route_decision_handler))
        .route("/stats", get(stats_handler))
        .route("/deployment", put(publish_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health — liveness probe.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "action-router",
        "epoch": state.router.deployment().epoch(),
    }))
}

/// POST /invoke — route one request.
///
/// Always answers 200: failures travel inside the envelope, including a body
/// that is not a request envelope at all.
async fn invoke_handler(
    State(state): State<AppState>,
    request: Result<Json<RequestEnvelope>, JsonRejection>,
) -> Json<ResponseEnvelope> {
    match request {
        Ok(Json(request)) => Json(state.router.route(request).await),
        Err(rejection) => Json(ResponseEnvelope::error(
            ErrorCode::ValidationError,
            rejection.body_text(),
        )),
    }
}

/// POST /services/:id/invoke — call one service directly.
///
/// This is the path a stale caller takes; the legacy shim still refuses
/// migrated actions here.
async fn service_invoke_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Result<Json<RequestEnvelope>, JsonRejection>,
) -> (StatusCode, Json<ResponseEnvelope>) {
    let request = match request {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return (
                StatusCode::OK,
                Json(ResponseEnvelope::error(ErrorCode::ValidationError, rejection.body_text())),
            )
        }
    };

    match state.router.invoke_service(&id, request).await {
        Some(envelope) => (StatusCode::OK, Json(envelope)),
        None => (
            StatusCode::NOT_FOUND,
            Json(ResponseEnvelope::error(
                ErrorCode::RouteNotFound,
                format!("no service '{}'", id),
            )),
        ),
    }
}

/// GET /routes — every registered action and where it stands.
async fn list_routes_handler(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.router.deployment().load();
    let registry = snapshot.registry();
    let legacy = snapshot.legacy_service();

    let actions: Vec<Value> = registry
        .descriptors()
        .into_iter()
        .map(|d| {
            json!({
                "action": d.canonical_name,
                "aliases": d.aliases,
                "service": d.target_service,
                "status": d.status,
                "state": d.migration_state(legacy),
                "payload": d.schema,
            })
        })
        .collect();

    Json(json!({
        "epoch": snapshot.epoch(),
        "legacy_service": legacy,
        "exclusions": snapshot.exclusions().len(),
        "retired": snapshot.exclusions().retired_actions().len(),
        "actions": actions,
    }))
}

/// GET /routes/:action — what `route` would do with this name right now.
async fn route_decision_handler(State(state): State<AppState>, Path(action): Path<String>) -> Json<Value> {
    let target = state.router.resolve(&action);
    Json(json!({
        "requested": action,
        "epoch": state.router.deployment().epoch(),
        "target": target,
    }))
}

/// GET /stats — routing decision counters.
async fn stats_handler(State(state): State<AppState>) -> Json<Value> {
    let recorder = state.router.recorder();
    Json(json!({
        "total": recorder.total(),
        "fallthrough": recorder.fallthrough_total(),
        "routes": recorder.stats(),
    }))
}

/// PUT /deployment — publish a new plan. A plan that fails validation leaves
/// the live deployment untouched.
async fn publish_handler(State(state): State<AppState>, body: String) -> (StatusCode, Json<Value>) {
    let published = MigrationPlan::from_yaml(&body).and_then(|plan| state.router.publish(&plan));
    match published {
        Ok(epoch) => {
            log::info!("Deployment: published epoch {}", epoch);
            (StatusCode::OK, Json(json!({"epoch": epoch})))
        }
        Err(e) => {
            log::warn!("Deployment: rejected plan: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": e.to_string(),
                    "epoch": state.router.deployment().epoch(),
                })),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::RouterConfig;
    use crate::farm::{build_router, Collection, FarmContext};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> (AppState, FarmContext) {
        let ctx = FarmContext::in_memory();
        let plan = MigrationPlan::builtin().unwrap();
        let router = build_router(&plan, &ctx, RouterConfig::default()).unwrap();
        (AppState::new(router), ctx)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (state, _) = state();
        let app = app_router(state);

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], crate::VERSION);
        assert_eq!(json["epoch"], 1);
    }

    #[tokio::test]
    async fn test_invoke_routes_to_owning_service() {
        let (state, ctx) = state();
        let app = app_router(state);

        let response = app
            .oneshot(post_json(
                "/invoke",
                json!({
                    "action": "createDeathRecord",
                    "payload": {"animal_id": "A-7", "cause": "disease"},
                    "callerContext": {"identity": "vet-1", "traceId": "t-1"}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert!(json["data"]["_id"].is_string());
        assert_eq!(ctx.store.write_count(Collection::DeathRecords), 1);
    }

    #[tokio::test]
    async fn test_invoke_malformed_body_is_validation_error() {
        let (state, _) = state();
        let app = app_router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/invoke")
            .header("Content-Type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "ValidationError");
    }

    #[tokio::test]
    async fn test_direct_legacy_call_gets_redirect() {
        let (state, ctx) = state();
        let app = app_router(state);

        let response = app
            .oneshot(post_json(
                "/services/farm-legacy/invoke",
                json!({"action": "create_treatment_record", "payload": {"animal_id": "A", "medication": "m"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["redirect"], "health-treatment");
        assert_eq!(ctx.store.write_count(Collection::TreatmentRecords), 0);
    }

    #[tokio::test]
    async fn test_unknown_service_is_404() {
        let (state, _) = state();
        let app = app_router(state);

        let response = app
            .oneshot(post_json("/services/nope/invoke", json!({"action": "x"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_routes_listing_and_decision() {
        let (state, _) = state();

        let response = app_router(state.clone())
            .oneshot(Request::builder().uri("/routes").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["legacy_service"], "farm-legacy");
        let fix = json["actions"]
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["action"] == "fix_diagnosis_treatment_status")
            .unwrap();
        assert_eq!(fix["state"], "legacy_only");

        let response = app_router(state)
            .oneshot(Request::builder().uri("/routes/getDeathStats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["target"]["decision"], "resolved");
        assert_eq!(json["target"]["service"], "health-death");
        assert_eq!(json["target"]["action"], "get_death_stats");
    }

    #[tokio::test]
    async fn test_stats_count_decisions() {
        let (state, _) = state();
        state
            .router
            .route(RequestEnvelope::with_json("totally_unknown_action", json!({})))
            .await;

        let response = app_router(state)
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["total"], 1);
        assert_eq!(json["fallthrough"], 1);
    }

    #[tokio::test]
    async fn test_publish_rejects_invalid_plan_and_keeps_epoch() {
        let (state, _) = state();

        let bad = "legacy_service: farm-legacy\n\
                   actions: [{action: get_death_stats, service: nowhere}]\n";
        let response = app_router(state.clone())
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/deployment")
                    .body(Body::from(bad))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.router.deployment().epoch(), 1);

        let good = MigrationPlan::builtin().unwrap().to_yaml().unwrap();
        let response = app_router(state.clone())
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/deployment")
                    .body(Body::from(good))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["epoch"], 2);
    }
}
