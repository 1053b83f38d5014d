//! Environment overrides for deployment-specific values
//!
//! These take precedence over the YAML file so a container can relocate the
//! store or the API port without a config change.

use std::path::PathBuf;

/// Default location of the YAML configuration
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Path of the YAML configuration (default: `config.yaml`)
///
/// Environment variable: `CONFIG_PATH`
pub fn config_path() -> PathBuf {
    std::env::var("CONFIG_PATH")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Read API port override
///
/// Environment variable: `API_PORT`
pub fn api_port_override() -> Option<u16> {
    std::env::var("API_PORT").ok().and_then(|s| s.parse().ok())
}

/// SQLite store path override
///
/// Environment variable: `STORE_PATH`
pub fn store_path_override() -> Option<String> {
    std::env::var("STORE_PATH")
        .ok()
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial(env)]
    fn test_default_values() {
        std::env::remove_var("CONFIG_PATH");
        std::env::remove_var("API_PORT");
        std::env::remove_var("STORE_PATH");

        assert_eq!(config_path(), PathBuf::from("config.yaml"));
        assert_eq!(api_port_override(), None);
        assert_eq!(store_path_override(), None);
    }

    #[test]
    #[serial(env)]
    fn test_env_override() {
        std::env::set_var("CONFIG_PATH", "/etc/coin-cache.yaml");
        std::env::set_var("API_PORT", "9100");
        std::env::set_var("STORE_PATH", "/tmp/cache.db");

        assert_eq!(config_path(), PathBuf::from("/etc/coin-cache.yaml"));
        assert_eq!(api_port_override(), Some(9100));
        assert_eq!(store_path_override(), Some("/tmp/cache.db".to_string()));

        std::env::remove_var("CONFIG_PATH");
        std::env::remove_var("API_PORT");
        std::env::remove_var("STORE_PATH");
    }

    #[test]
    #[serial(env)]
    fn test_unparsable_port_is_ignored() {
        std::env::set_var("API_PORT", "not-a-port");
        assert_eq!(api_port_override(), None);
        std::env::remove_var("API_PORT");
    }
}
