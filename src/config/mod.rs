//! Configuration module
//!
//! This module provides:
//! - Configuration types (`AppConfig`, `StoreConfig`, `ScheduleConfig`, `ApiConfig`)
//! - YAML loading functionality (`load_config`, `load_config_or_default`)
//! - Environment overrides (`constants`)
//! - Logging setup (`logging`)

pub mod constants;
mod loader;
pub mod logging;
mod types;

// Re-export types
pub use types::{ApiConfig, AppConfig, ScheduleConfig, StoreConfig};

// Re-export loader functions
pub use loader::{load_config, load_config_from_str, load_config_or_default};

pub use logging::{init_logging, LoggingConfig};
