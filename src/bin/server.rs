//! action-router HTTP server binary.
//!
//! Loads the migration plan, binds the legacy shim and every declared
//! service, and serves the router over HTTP.
//!
//! # Environment Variables
//!
//! - `PORT` — HTTP port (default: 8080)
//! - `MIGRATION_PLAN` — plan YAML file (default: the embedded plan)
//! - `DOWNSTREAM_TIMEOUT_MS` — per-call deadline, `0` to disable (default: 10000)
//! - `RUST_LOG` — Tracing filter (default: "info,action_router=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! MIGRATION_PLAN=config/migration_plan.yaml RUST_LOG=migration=debug cargo run --bin server
//! ```

use anyhow::Context;

use action_router::config::{Settings, DEFAULT_LOG_FILTER};
use action_router::farm::{build_router, FarmContext};
use action_router::registry::MigrationState;
use action_router::server::{app_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let settings = Settings::from_env()?;
    let plan = settings.load_plan().context("loading migration plan")?;
    let router = build_router(&plan, &FarmContext::in_memory(), settings.router_config())
        .context("building router")?;

    {
        let snapshot = router.deployment().load();
        let registry = snapshot.registry();
        tracing::info!(
            "Migration plan: {} actions ({} migrated, {} legacy-only, {} retired), legacy service '{}'",
            registry.len(),
            registry.actions_in(MigrationState::Migrated).len(),
            registry.actions_in(MigrationState::LegacyOnly).len(),
            registry.actions_in(MigrationState::Retired).len(),
            snapshot.legacy_service(),
        );
    }

    let app = app_router(AppState::new(router));
    let bind_addr = settings.bind_addr();

    tracing::info!("action-router {} starting on {}", action_router::VERSION, bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health               — liveness probe");
    tracing::info!("  POST /invoke               — route one action");
    tracing::info!("  POST /services/:id/invoke  — direct service call");
    tracing::info!("  GET  /routes[/:action]     — registry inspection");
    tracing::info!("  GET  /stats                — routing counters");
    tracing::info!("  PUT  /deployment           — publish a plan");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
