//! Configuration validation for Wayfarer API.
//!
//! Only settings that make the process unusable are rejected here. Missing
//! Google credentials are reported by the endpoints that need them.

use super::error::{ConfigResult, ConfigurationError};
use super::{ACTIVITY_STORES, AppConfig, SESSION_STORES, USER_STORES};

/// Validates configuration combinations at startup.
///
/// | Setting            | Rule                                               |
/// |--------------------|----------------------------------------------------|
/// | `server.port`      | non-zero                                           |
/// | `server.*timeout*` | non-zero                                           |
/// | `activity.store`   | one of `firestore`, `redis`, `memory`, `disabled`  |
/// | `activity.store`   | `redis` requires `REDIS_URL`                       |
/// | `google.session_store` | one of `vertex`, `memory`                      |
/// | `database.user_store`  | one of `postgres`, `memory`                    |
/// | `database.url`     | requires the `database` feature                    |
#[derive(Debug)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire application configuration.
    pub fn validate(config: &AppConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();

        for check in [
            Self::validate_server(config),
            Self::validate_activity_store(config),
            Self::validate_stores(config),
            Self::validate_database(config),
        ] {
            match check {
                Ok(()) => {}
                Err(ConfigurationError::Multiple(errs)) => errors.extend(errs),
                Err(e) => errors.push(e),
            }
        }

        ConfigurationError::collect(errors).map_or(Ok(()), Err)
    }

    /// Validate listener and timeout settings.
    pub fn validate_server(config: &AppConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if config.server.port == 0 {
            errors.push(ConfigurationError::invalid(
                "server.port is 0",
                "Set WAYFARER__SERVER__PORT or pass --port with a non-zero port",
            ));
        }
        if config.server.timeout_secs == 0 {
            errors.push(ConfigurationError::invalid(
                "server.timeout_secs is 0, every request would time out",
                "Set WAYFARER__SERVER__TIMEOUT_SECS to a positive number of seconds",
            ));
        }
        if config.server.upstream_timeout_secs == 0 {
            errors.push(ConfigurationError::invalid(
                "server.upstream_timeout_secs is 0, every Google API call would time out",
                "Set WAYFARER__SERVER__UPSTREAM_TIMEOUT_SECS to a positive number of seconds",
            ));
        }

        ConfigurationError::collect(errors).map_or(Ok(()), Err)
    }

    /// Validate the recent-activity backend selection.
    pub fn validate_activity_store(config: &AppConfig) -> ConfigResult<()> {
        let store = config.activity.store.as_str();
        if !ACTIVITY_STORES.contains(&store) {
            return Err(ConfigurationError::invalid(
                format!("ACTIVITY_STORE has invalid value '{store}'"),
                format!("Set ACTIVITY_STORE to one of: {}", ACTIVITY_STORES.join(", ")),
            ));
        }

        if store == "redis" && config.redis.url.is_none() {
            return Err(ConfigurationError::missing_required(
                "Redis URL",
                "Recent-activity index backed by Redis (ACTIVITY_STORE=redis)",
                "REDIS_URL (e.g., redis://localhost:6379)",
            ));
        }

        Ok(())
    }

    /// Validate the session and user backend selections.
    pub fn validate_stores(config: &AppConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();

        let sessions = config.google.session_store.as_str();
        if !SESSION_STORES.contains(&sessions) {
            errors.push(ConfigurationError::invalid(
                format!("SESSION_STORE has invalid value '{sessions}'"),
                format!("Set SESSION_STORE to one of: {}", SESSION_STORES.join(", ")),
            ));
        }
        let users = config.database.user_store.as_str();
        if !USER_STORES.contains(&users) {
            errors.push(ConfigurationError::invalid(
                format!("USER_STORE has invalid value '{users}'"),
                format!("Set USER_STORE to one of: {}", USER_STORES.join(", ")),
            ));
        }

        ConfigurationError::collect(errors).map_or(Ok(()), Err)
    }

    /// Validate that a configured database can actually be used by this build.
    #[cfg(feature = "database")]
    pub fn validate_database(_config: &AppConfig) -> ConfigResult<()> {
        Ok(())
    }

    #[cfg(not(feature = "database"))]
    pub fn validate_database(config: &AppConfig) -> ConfigResult<()> {
        if config.database.url.is_some() {
            return Err(ConfigurationError::feature_unavailable(
                "PostgreSQL user profiles",
                "The 'database' feature is not enabled in this build",
                "Rebuild with --features database, or unset DATABASE_URL / DB_HOST and set \
                USER_STORE=memory for process-local user profiles",
            ));
        }
        Ok(())
    }
}
