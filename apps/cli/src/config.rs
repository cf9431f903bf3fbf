//! Operator configuration: YAML file, then environment overrides.

use anyhow::{Context, Result};
use points_core::Points;
use points_engine::{EngineSettings, ReconcileMode, ThresholdRule, DEFAULT_EXCELLENCE_BONUS};
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_ENV: &str = "POINTS_CONFIG";
pub const DATABASE_URL_ENV: &str = "POINTS_DATABASE_URL";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub reconcile_mode: ReconcileMode,
    pub excellence_bonus_points: Points,
    pub service_categories: Vec<String>,
    pub log_filter: String,
    /// Low-balance alert rules checked by the `thresholds` command.
    pub thresholds: Vec<ThresholdRule>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let engine = EngineSettings::default();
        Self {
            database_url: persistence::default_sqlite_url().to_string(),
            reconcile_mode: ReconcileMode::default(),
            excellence_bonus_points: DEFAULT_EXCELLENCE_BONUS,
            service_categories: engine.service_categories,
            log_filter: "info".to_string(),
            thresholds: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("invalid config YAML")
    }

    /// Load from `path` (or `POINTS_CONFIG`), defaulting when neither is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var(CONFIG_ENV).ok();
        let path = path.or(from_env.as_deref().map(Path::new));
        let mut cfg = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                Self::from_yaml(&text)?
            }
            None => Self::default(),
        };
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            cfg.database_url = url;
        }
        Ok(cfg)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            excellence_bonus_points: self.excellence_bonus_points,
            service_categories: self.service_categories.clone(),
        }
    }
}
