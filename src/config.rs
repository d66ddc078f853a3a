//! Configuration
//!
//! Settings are loaded from environment variables with sensible defaults for
//! local development. A `.env` file is honored when present.
//!
//! Configuration errors never prevent startup: unparseable values fall back
//! to defaults with a warning.

use std::time::Duration;

/// Runtime settings for the chat core
#[derive(Debug, Clone)]
pub struct Settings {
    /// Time-to-live for a user's presence key; absence means offline
    pub presence_ttl: Duration,
    /// Time-to-live for a user's session set, refreshed on every add
    pub session_ttl: Duration,
    /// Maximum concurrent sessions per user, enforced at connection accept
    pub max_sessions_per_user: usize,
    /// Messages older than this many days are purged by the retention sweep
    pub message_retention_days: i64,
    /// Notifications older than this many days are purged
    pub notification_retention_days: i64,
    /// Rejected friend requests older than this many days are purged
    pub rejected_request_retention_days: i64,
    /// Interval between retention sweeps
    pub sweep_interval: Duration,
    /// PostgreSQL connection string; `None` disables the persisted backend
    pub database_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            presence_ttl: Duration::from_secs(3600),
            session_ttl: Duration::from_secs(7200),
            max_sessions_per_user: 5,
            message_retention_days: 30,
            notification_retention_days: 30,
            rejected_request_retention_days: 30,
            sweep_interval: Duration::from_secs(3600),
            database_url: None,
        }
    }
}

impl Settings {
    /// Load settings from the environment
    ///
    /// Reads a `.env` file if one exists, then the process environment.
    /// Missing or malformed values fall back to defaults.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        Self {
            presence_ttl: Duration::from_secs(env_u64(
                "CHATX_PRESENCE_TTL_SECS",
                defaults.presence_ttl.as_secs(),
            )),
            session_ttl: Duration::from_secs(env_u64(
                "CHATX_SESSION_TTL_SECS",
                defaults.session_ttl.as_secs(),
            )),
            max_sessions_per_user: env_u64(
                "CHATX_MAX_SESSIONS_PER_USER",
                defaults.max_sessions_per_user as u64,
            ) as usize,
            message_retention_days: env_i64(
                "CHATX_MESSAGE_RETENTION_DAYS",
                defaults.message_retention_days,
            ),
            notification_retention_days: env_i64(
                "CHATX_NOTIFICATION_RETENTION_DAYS",
                defaults.notification_retention_days,
            ),
            rejected_request_retention_days: env_i64(
                "CHATX_REJECTED_REQUEST_RETENTION_DAYS",
                defaults.rejected_request_retention_days,
            ),
            sweep_interval: Duration::from_secs(env_u64(
                "CHATX_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )),
            database_url: std::env::var("DATABASE_URL").ok(),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("{} is not a valid integer, using default {}", key, default);
            default
        }),
        Err(_) => default,
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("{} is not a valid integer, using default {}", key, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.presence_ttl, Duration::from_secs(3600));
        assert_eq!(settings.session_ttl, Duration::from_secs(7200));
        assert_eq!(settings.max_sessions_per_user, 5);
        assert_eq!(settings.message_retention_days, 30);
        assert!(settings.database_url.is_none());
    }

    #[test]
    fn test_env_u64_missing_key_uses_default() {
        assert_eq!(env_u64("CHATX_TEST_KEY_THAT_DOES_NOT_EXIST", 42), 42);
    }

    #[test]
    fn test_env_i64_missing_key_uses_default() {
        assert_eq!(env_i64("CHATX_TEST_KEY_THAT_DOES_NOT_EXIST", -7), -7);
    }
}
