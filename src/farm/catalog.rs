//! Wiring of the farm actions into services.
//!
//! The monolith gets every action behind the legacy shim. Each service the
//! plan declares is bound either in process, over the slice of the table the
//! plan assigns to it, or as a remote endpoint when the plan gives one.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::actions::{FarmContext, FARM_ACTIONS};
use crate::contract::router::{Router, RouterConfig};
use crate::contract::service::{Service, ServiceError, ServiceTable};
use crate::legacy::LegacyShim;
use crate::registry::{DeploymentHandle, MigrationPlan, PlanError};
use crate::services::{ActionCall, ActionTable, LocalService, RemoteService};

#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("cannot bind service: {0}")]
    Service(#[from] ServiceError),
}

/// Every farm action, as the monolith knows them.
pub fn action_table(ctx: &FarmContext) -> ActionTable {
    let mut table = ActionTable::new();
    for &(name, action) in FARM_ACTIONS {
        let ctx = ctx.clone();
        table.register(name, move |call: ActionCall| {
            let result = action(&ctx, call);
            async move { result }
        });
    }
    table
}

/// Bind the legacy shim and every declared service.
pub fn bind_services(
    plan: &MigrationPlan,
    deployment: &DeploymentHandle,
    ctx: &FarmContext,
    remote_timeout: Duration,
) -> Result<ServiceTable, BootError> {
    let table = action_table(ctx);
    let snapshot = deployment.load();
    let mut services = ServiceTable::new();

    services.bind(Arc::new(LegacyShim::new(table.clone(), deployment.clone())));

    for spec in &plan.services {
        let handle: Arc<dyn Service> = match &spec.endpoint {
            Some(endpoint) => Arc::new(RemoteService::with_timeout(
                spec.id.clone(),
                endpoint.clone(),
                remote_timeout,
            )?),
            None => {
                let owned = snapshot.registry().actions_for(spec.id.as_str());
                Arc::new(LocalService::new(
                    spec.id.clone(),
                    table.subset(owned.iter().map(String::as_str)),
                ))
            }
        };
        services.bind(handle);
    }
    Ok(services)
}

/// Build a ready router for `plan` over the farm actions in `ctx`.
pub fn build_router(plan: &MigrationPlan, ctx: &FarmContext, config: RouterConfig) -> Result<Router, BootError> {
    let deployment = DeploymentHandle::from_plan(plan)?;
    let remote_timeout = config
        .downstream_timeout
        .unwrap_or(Duration::from_millis(crate::services::remote::DEFAULT_TIMEOUT_MS));
    let services = bind_services(plan, &deployment, ctx, remote_timeout)?;
    Ok(Router::new(deployment, services)?.with_config(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_table_has_every_farm_action() {
        let table = action_table(&FarmContext::in_memory());
        assert_eq!(table.len(), FARM_ACTIONS.len());
        assert!(table.contains("getDeathStats"));
    }

    #[test]
    fn test_builtin_plan_binds_every_service() {
        let plan = MigrationPlan::builtin().unwrap();
        let router = build_router(&plan, &FarmContext::in_memory(), RouterConfig::default()).unwrap();

        let ids: Vec<String> = router.services().ids().into_iter().map(|id| id.to_string()).collect();
        assert!(ids.contains(&"farm-legacy".to_string()));
        assert!(ids.contains(&"health-death".to_string()));
        assert_eq!(ids.len(), plan.services.len() + 1);
    }

    #[test]
    fn test_local_services_get_only_their_actions() {
        let plan = MigrationPlan::builtin().unwrap();
        let router = build_router(&plan, &FarmContext::in_memory(), RouterConfig::default()).unwrap();
        let registry = router.deployment().load();

        let death = router
            .services()
            .descriptors(registry.registry())
            .into_iter()
            .find(|d| d.id.as_str() == "health-death")
            .unwrap();
        assert_eq!(
            death.owned_actions.into_iter().collect::<Vec<_>>(),
            vec!["create_death_record", "get_death_stats"]
        );
    }

    #[tokio::test]
    async fn test_publish_rejects_move_onto_service_without_handler() {
        let plan = MigrationPlan::builtin().unwrap();
        let router = build_router(&plan, &FarmContext::in_memory(), RouterConfig::default()).unwrap();

        let mut moved = plan.clone();
        for row in &mut moved.actions {
            if row.action == "fix_diagnosis_treatment_status" {
                row.service = "health-records".into();
            }
        }

        let err = router.publish(&moved).unwrap_err();
        assert!(matches!(
            &err,
            PlanError::MissingHandler { action, service }
                if action == "fix_diagnosis_treatment_status" && service.as_str() == "health-records"
        ));
        assert_eq!(router.deployment().epoch(), 1);
        assert!(!router.deployment().load().exclusions().contains("fix_diagnosis_treatment_status"));

        let reply = router
            .route(crate::contract::RequestEnvelope::with_json(
                "fix_diagnosis_treatment_status",
                serde_json::json!({}),
            ))
            .await;
        assert!(reply.is_success(), "{:?}", reply);
        assert_eq!(router.recorder().outcome_count("farm-legacy", "ok"), 1);
    }

    #[test]
    fn test_endpoint_binds_remote_service() {
        let plan = MigrationPlan::from_yaml(
            "legacy_service: farm-legacy\n\
             services: [{id: health-cost, endpoint: 'http://127.0.0.1:9/invoke'}]\n\
             actions: [{action: calculate_treatment_cost, service: health-cost}]\n",
        )
        .unwrap();
        let router = build_router(&plan, &FarmContext::in_memory(), RouterConfig::default()).unwrap();
        assert!(router.services().contains("health-cost"));
    }
}
