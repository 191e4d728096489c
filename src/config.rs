//! Runtime configuration.
//!
//! All settings come from the process environment. The binary loads a
//! `.env` file first when present, so local runs and CI can share the
//! same variable names:
//!
//! - `SUPABASE_URL`, `SUPABASE_SERVICE_ROLE_KEY`: credential store access
//! - `KIS_APP_KEY`, `KIS_APP_SECRET`: fallback API key pair
//! - `CREDSTORE_TIMEOUT_SECS`: store request timeout (default 30)
//!
//! Empty values are treated as unset.

use std::time::Duration;

use tracing::warn;

pub const ENV_STORE_URL: &str = "SUPABASE_URL";
pub const ENV_STORE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
pub const ENV_APP_KEY: &str = "KIS_APP_KEY";
pub const ENV_APP_SECRET: &str = "KIS_APP_SECRET";
pub const ENV_TIMEOUT_SECS: &str = "CREDSTORE_TIMEOUT_SECS";

/// Store request timeout in seconds.
/// 30s tolerates a slow store while keeping pipeline runs bounded.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Default)]
pub struct Settings {
    pub store_url: Option<String>,
    pub store_service_key: Option<String>,
    pub app_key: Option<String>,
    pub app_secret: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let timeout_secs = read(ENV_TIMEOUT_SECS).and_then(|raw| match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => Some(secs),
            _ => {
                warn!(value = %raw, "Ignoring invalid {}", ENV_TIMEOUT_SECS);
                None
            }
        });

        Self {
            store_url: read(ENV_STORE_URL),
            store_service_key: read(ENV_STORE_KEY),
            app_key: read(ENV_APP_KEY),
            app_secret: read(ENV_APP_SECRET),
            timeout_secs,
        }
    }

    /// Store address and secret, if both are configured
    pub fn store_access(&self) -> Option<(&str, &str)> {
        match (&self.store_url, &self.store_service_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }

    /// Environment key pair, if both halves are configured
    pub fn env_key_pair(&self) -> Option<(&str, &str)> {
        match (&self.app_key, &self.app_secret) {
            (Some(key), Some(secret)) => Some((key.as_str(), secret.as_str())),
            _ => None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Settings")
            .field("store_url", &self.store_url)
            .field("store_service_key", &redact(&self.store_service_key))
            .field("app_key", &redact(&self.app_key))
            .field("app_secret", &redact(&self.app_secret))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_complete_settings() {
        let s = settings(&[
            (ENV_STORE_URL, "https://abc.supabase.co"),
            (ENV_STORE_KEY, "service"),
            (ENV_APP_KEY, "key"),
            (ENV_APP_SECRET, "secret"),
            (ENV_TIMEOUT_SECS, "5"),
        ]);
        assert_eq!(s.store_access(), Some(("https://abc.supabase.co", "service")));
        assert_eq!(s.env_key_pair(), Some(("key", "secret")));
        assert_eq!(s.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let s = settings(&[(ENV_STORE_URL, "  "), (ENV_STORE_KEY, "service"), (ENV_APP_KEY, "")]);
        assert_eq!(s.store_url, None);
        assert_eq!(s.store_access(), None);
        assert_eq!(s.app_key, None);
    }

    #[test]
    fn test_half_pair_is_absent() {
        let s = settings(&[(ENV_APP_KEY, "key")]);
        assert_eq!(s.env_key_pair(), None);
    }

    #[test]
    fn test_invalid_timeout_uses_default() {
        let s = settings(&[(ENV_TIMEOUT_SECS, "soon")]);
        assert_eq!(s.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let s = settings(&[(ENV_TIMEOUT_SECS, "0")]);
        assert_eq!(s.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let s = settings(&[(ENV_STORE_KEY, "service"), (ENV_APP_SECRET, "hunter2")]);
        let debug = format!("{:?}", s);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("\"service\""));
    }
}
