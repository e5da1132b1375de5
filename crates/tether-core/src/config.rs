// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Executor configuration loaded from environment variables.

use std::env;
use std::time::Duration;

/// Default deadline for timed operations, in milliseconds.
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 30_000;

/// Runtime-wide executor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Deadline applied to timed operations that do not name their own (default: 30_000)
    pub operation_timeout_ms: u64,
    /// Emit a stop event for every operation (default: true)
    pub telemetry_enabled: bool,
}

impl ExecutorConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `TETHER_OPERATION_TIMEOUT_MS`: deadline for timed operations (default: 30000)
    /// - `TETHER_TELEMETRY`: `true`/`1` or `false`/`0` (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        let operation_timeout_ms = match env::var("TETHER_OPERATION_TIMEOUT_MS") {
            Ok(value) => value.parse().map_err(|_| {
                ConfigError::Invalid(
                    "TETHER_OPERATION_TIMEOUT_MS",
                    "must be a non-negative integer",
                )
            })?,
            Err(_) => DEFAULT_OPERATION_TIMEOUT_MS,
        };

        let telemetry_enabled = match env::var("TETHER_TELEMETRY") {
            Ok(value) => match value.as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(ConfigError::Invalid(
                        "TETHER_TELEMETRY",
                        "must be true, false, 1 or 0",
                    ));
                }
            },
            Err(_) => true,
        };

        Ok(Self {
            operation_timeout_ms,
            telemetry_enabled,
        })
    }

    /// Set the default operation timeout.
    pub fn with_operation_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.operation_timeout_ms = timeout_ms;
        self
    }

    /// Enable or disable stop telemetry.
    pub fn with_telemetry(mut self, enabled: bool) -> Self {
        self.telemetry_enabled = enabled;
        self
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            telemetry_enabled: true,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const TIMEOUT_VAR: &str = "TETHER_OPERATION_TIMEOUT_MS";
    const TELEMETRY_VAR: &str = "TETHER_TELEMETRY";

    // Env vars are process-global; config tests take this lock
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Restores both config variables when dropped.
    struct SavedEnv(Vec<(&'static str, Option<String>)>);

    impl Drop for SavedEnv {
        fn drop(&mut self) {
            for (key, value) in &self.0 {
                set_or_remove(key, value.as_deref());
            }
        }
    }

    fn set_or_remove(key: &str, value: Option<&str>) {
        // SAFETY: callers hold ENV_LOCK
        unsafe {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }

    /// Load the config with the given values for the two variables.
    fn load_with(
        timeout: Option<&str>,
        telemetry: Option<&str>,
    ) -> Result<ExecutorConfig, ConfigError> {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _saved = SavedEnv(
            [TIMEOUT_VAR, TELEMETRY_VAR]
                .into_iter()
                .map(|key| (key, env::var(key).ok()))
                .collect(),
        );
        set_or_remove(TIMEOUT_VAR, timeout);
        set_or_remove(TELEMETRY_VAR, telemetry);
        ExecutorConfig::from_env()
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let config = load_with(None, None).unwrap();
        assert_eq!(config, ExecutorConfig::default());
        assert_eq!(config.operation_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_config_from_env_overrides() {
        let config = load_with(Some("1500"), Some("0")).unwrap();
        assert_eq!(config.operation_timeout_ms, 1500);
        assert!(!config.telemetry_enabled);

        let config = load_with(None, Some("true")).unwrap();
        assert!(config.telemetry_enabled);
    }

    #[test]
    fn test_config_rejects_bad_timeout() {
        let err = load_with(Some("soon"), None).unwrap_err();
        assert!(err.to_string().contains(TIMEOUT_VAR));

        assert!(load_with(Some("-5"), None).is_err());
    }

    #[test]
    fn test_config_rejects_bad_telemetry_flag() {
        let err = load_with(None, Some("maybe")).unwrap_err();
        assert!(err.to_string().contains(TELEMETRY_VAR));
    }

    #[test]
    fn test_builder_pattern() {
        let config = ExecutorConfig::default()
            .with_operation_timeout_ms(250)
            .with_telemetry(false);

        assert_eq!(config.operation_timeout(), Duration::from_millis(250));
        assert!(!config.telemetry_enabled);
    }
}
