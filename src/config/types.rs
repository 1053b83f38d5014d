//! Configuration types for the coin cache
//!
//! Loaded from YAML. Every section has serde defaults, so a partial file (or
//! none at all) yields the documented defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::upbit::UpbitConfig;
use crate::error::AppError;

// ============================================================================
// Sections
// ============================================================================

/// Persistent store location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "coin-cache.db".to_string(),
        }
    }
}

/// Periods of the background jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Miner reconcile tick
    pub reconcile_interval_secs: u64,
    /// Per-coin trade refresh tick
    pub refresh_interval_secs: u64,
    /// Prohibitor expiry sweep tick
    pub ban_sweep_interval_secs: u64,
    /// Upper bound on waiting for in-flight ticks at shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: 600,
            refresh_interval_secs: 600,
            ban_sweep_interval_secs: 60,
            shutdown_timeout_secs: 30,
        }
    }
}

impl ScheduleConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn ban_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.ban_sweep_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    fn validate(&self) -> Result<(), AppError> {
        // tokio intervals panic on a zero period
        for (name, value) in [
            ("reconcile_interval_secs", self.reconcile_interval_secs),
            ("refresh_interval_secs", self.refresh_interval_secs),
            ("ban_sweep_interval_secs", self.ban_sweep_interval_secs),
        ] {
            if value == 0 {
                return Err(AppError::Config(format!("schedule.{} must be > 0", name)));
            }
        }
        Ok(())
    }
}

/// Read API server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// HTTP server port
    pub port: u16,
    pub enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 8888,
            enabled: true,
        }
    }
}

/// Root application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    /// Remote market-data source
    pub service: UpbitConfig,
    pub schedule: ScheduleConfig,
    pub api: ApiConfig,
}

impl AppConfig {
    /// Validate all configuration rules
    pub fn validate(&self) -> Result<(), AppError> {
        if self.store.path.trim().is_empty() {
            return Err(AppError::Config("store.path cannot be empty".to_string()));
        }

        self.service.validate()?;
        self.schedule.validate()?;

        if self.api.enabled && self.api.port == 0 {
            return Err(AppError::Config("api.port must be > 0".to_string()));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
