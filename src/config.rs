//! Process settings read from the environment.
//!
//! # Environment Variables
//!
//! - `PORT` — HTTP port (default: 8080)
//! - `MIGRATION_PLAN` — path to a plan YAML file (default: the plan embedded
//!   from `config/migration_plan.yaml`)
//! - `DOWNSTREAM_TIMEOUT_MS` — deadline for one service call; `0` disables it
//!   (default: 10000)
//! - `RUST_LOG` — tracing filter (default: "info,action_router=debug")

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::contract::router::RouterConfig;
use crate::registry::{MigrationPlan, PlanError};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_LOG_FILTER: &str = "info,action_router=debug";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub port: u16,
    pub plan_path: Option<PathBuf>,
    pub downstream_timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            plan_path: None,
            downstream_timeout: Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable source. Unset or empty variables keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(port) = var("PORT") {
            settings.port = port.trim().parse().map_err(|_| SettingsError::Invalid {
                name: "PORT",
                expected: "a port number",
                value: port.clone(),
            })?;
        }

        settings.plan_path = var("MIGRATION_PLAN").map(PathBuf::from);

        if let Some(ms) = var("DOWNSTREAM_TIMEOUT_MS") {
            let ms: u64 = ms.trim().parse().map_err(|_| SettingsError::Invalid {
                name: "DOWNSTREAM_TIMEOUT_MS",
                expected: "milliseconds",
                value: ms.clone(),
            })?;
            settings.downstream_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }

        Ok(settings)
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            downstream_timeout: self.downstream_timeout,
        }
    }

    /// The configured plan file, or the embedded plan.
    pub fn load_plan(&self) -> Result<MigrationPlan, PlanError> {
        match &self.plan_path {
            Some(path) => MigrationPlan::from_file(path),
            None => MigrationPlan::builtin(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.bind_addr(), "0.0.0.0:8080");
        assert!(settings.load_plan().is_ok());
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("PORT", "9090"),
            ("MIGRATION_PLAN", "/etc/plan.yaml"),
            ("DOWNSTREAM_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(settings.port, 9090);
        assert_eq!(settings.plan_path, Some(PathBuf::from("/etc/plan.yaml")));
        assert_eq!(settings.router_config().downstream_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let settings = Settings::from_lookup(lookup(&[("DOWNSTREAM_TIMEOUT_MS", "0")])).unwrap();
        assert_eq!(settings.downstream_timeout, None);
    }

    #[test]
    fn test_bad_port_is_reported() {
        let err = Settings::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_missing_plan_file_fails() {
        let settings = Settings::from_lookup(lookup(&[("MIGRATION_PLAN", "/nonexistent/plan.yaml")])).unwrap();
        assert!(matches!(settings.load_plan(), Err(PlanError::Io(_))));
    }
}
