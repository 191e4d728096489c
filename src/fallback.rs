//! Ordered resolution of the API key pair.
//!
//! Tiers are consulted in order until one yields a complete pair:
//! 1. the credential store (when the gate reports it available)
//! 2. `KIS_APP_KEY` / `KIS_APP_SECRET` from the environment
//!
//! Seeding goes the other way: an environment pair can be pushed into the
//! store so later runs resolve from it.

use std::fmt;

use tracing::{debug, info};

use crate::config::Settings;
use crate::credentials::{ApiKeyPair, CredentialManager};

/// Tier that supplied the resolved pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Store,
    Env,
    None,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Store => "store",
            CredentialSource::Env => "env",
            CredentialSource::None => "none",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub app_key: Option<String>,
    pub app_secret: Option<String>,
    pub source: CredentialSource,
}

impl ResolvedCredentials {
    fn from_pair(pair: ApiKeyPair, source: CredentialSource) -> Self {
        Self {
            app_key: Some(pair.app_key),
            app_secret: Some(pair.app_secret),
            source,
        }
    }

    fn none() -> Self {
        Self {
            app_key: None,
            app_secret: None,
            source: CredentialSource::None,
        }
    }

    pub fn key_pair(&self) -> Option<ApiKeyPair> {
        match (&self.app_key, &self.app_secret) {
            (Some(key), Some(secret)) => Some(ApiKeyPair::new(key.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

impl fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("key_pair", &self.key_pair())
            .field("source", &self.source)
            .finish()
    }
}

pub struct FallbackResolver {
    manager: CredentialManager,
    settings: Settings,
}

impl FallbackResolver {
    pub fn new(manager: CredentialManager, settings: Settings) -> Self {
        Self { manager, settings }
    }

    /// Resolve the key pair from the first tier holding a complete one
    pub async fn get_credentials_with_fallback(&self) -> ResolvedCredentials {
        if self.manager.is_available() {
            if let Some(pair) = self.manager.get_kis_credentials().await {
                info!(source = %CredentialSource::Store, "Loaded API key pair");
                return ResolvedCredentials::from_pair(pair, CredentialSource::Store);
            }
        } else {
            let reason = self.manager.gate().get_init_error().unwrap_or_default();
            debug!(reason = %reason, "Skipping credential store");
        }

        if let Some((key, secret)) = self.settings.env_key_pair() {
            info!(source = %CredentialSource::Env, "Loaded API key pair");
            return ResolvedCredentials::from_pair(ApiKeyPair::new(key, secret), CredentialSource::Env);
        }

        ResolvedCredentials::none()
    }

    /// Push a key pair into the store. `false` without writing when the
    /// store is unavailable.
    pub async fn sync_to_store(&self, app_key: &str, app_secret: &str) -> bool {
        if !self.manager.is_available() {
            return false;
        }
        self.manager.update_credentials(app_key, app_secret).await
    }

    /// Seed the store from the environment pair, if one is configured
    pub async fn sync_env_to_store(&self) -> bool {
        match self.settings.env_key_pair() {
            Some((key, secret)) => self.sync_to_store(key, secret).await,
            None => {
                debug!("No environment key pair to sync");
                false
            }
        }
    }
}
