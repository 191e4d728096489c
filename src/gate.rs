//! Lazy, once-per-process connection to the credential store.
//!
//! The first connection attempt decides whether the store can be used at all. A
//! missing URL or key, or a client that cannot be constructed, leaves the
//! gate permanently `Unavailable` with the reason cached; fixing the
//! environment requires a process restart.

use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::CoreError;
use crate::store::CredentialTable;

/// Shared handle to the store collaborator
pub type StoreHandle = Arc<dyn CredentialTable>;

/// Why the store cannot be used
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    #[error("store client support is not compiled in (enable the `rest` feature)")]
    ClientUnsupported,

    #[error("SUPABASE_URL or SUPABASE_SERVICE_ROLE_KEY is not set")]
    MissingConfiguration,

    #[error("failed to create store client: {0}")]
    ClientInit(String),
}

/// Result of probing the store
#[derive(Clone)]
pub enum Capability {
    Available(StoreHandle),
    Unavailable(Unavailable),
}

impl Capability {
    pub fn handle(&self) -> Option<&StoreHandle> {
        match self {
            Capability::Available(handle) => Some(handle),
            Capability::Unavailable(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&Unavailable> {
        match self {
            Capability::Available(_) => None,
            Capability::Unavailable(reason) => Some(reason),
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Available(_) => f.write_str("Available"),
            Capability::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

pub struct StoreGate {
    settings: Settings,
    state: OnceLock<Capability>,
}

impl StoreGate {
    /// Gate that connects on first use from `settings`
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            state: OnceLock::new(),
        }
    }

    /// Gate over an already-constructed store
    pub fn with_table(table: StoreHandle) -> Self {
        Self::resolved(Capability::Available(table))
    }

    /// Gate that is permanently unavailable
    pub fn unavailable(reason: Unavailable) -> Self {
        Self::resolved(Capability::Unavailable(reason))
    }

    fn resolved(capability: Capability) -> Self {
        let state = OnceLock::new();
        let _ = state.set(capability);
        Self {
            settings: Settings::default(),
            state,
        }
    }

    /// Probe the store, connecting on the first call only
    pub fn get_handle(&self) -> Capability {
        self.state.get_or_init(|| Self::connect(&self.settings)).clone()
    }

    pub fn is_available(&self) -> bool {
        matches!(self.get_handle(), Capability::Available(_))
    }

    /// Cached failure message, probing first if needed
    pub fn get_init_error(&self) -> Option<String> {
        self.get_handle().reason().map(ToString::to_string)
    }

    fn connect(settings: &Settings) -> Capability {
        match Self::build_table(settings) {
            Ok(table) => {
                debug!("Credential store client initialized");
                Capability::Available(table)
            }
            Err(reason) => {
                warn!(error = %CoreError::from(reason.clone()), "Credential store unavailable");
                Capability::Unavailable(reason)
            }
        }
    }

    #[cfg(feature = "rest")]
    fn build_table(settings: &Settings) -> Result<StoreHandle, Unavailable> {
        let (url, key) = settings
            .store_access()
            .ok_or(Unavailable::MissingConfiguration)?;
        let table = crate::store::RestTable::new(url, key, settings.timeout())
            .map_err(|e| Unavailable::ClientInit(e.to_string()))?;
        Ok(Arc::new(table))
    }

    #[cfg(not(feature = "rest"))]
    fn build_table(_settings: &Settings) -> Result<StoreHandle, Unavailable> {
        Err(Unavailable::ClientUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTable;

    #[test]
    fn test_missing_configuration_is_cached() {
        let gate = StoreGate::new(Settings::default());
        assert!(!gate.is_available());
        let first = gate.get_init_error().expect("reason cached");
        assert!(first.contains("SUPABASE_URL"));
        // Second check returns the same cached reason without retrying
        assert_eq!(gate.get_init_error(), Some(first));
    }

    #[test]
    fn test_half_configuration_is_unavailable() {
        let settings = Settings {
            store_url: Some("https://abc.supabase.co".to_string()),
            ..Settings::default()
        };
        let gate = StoreGate::new(settings);
        assert!(!gate.is_available());
    }

    #[cfg(feature = "rest")]
    #[test]
    fn test_configured_gate_connects() {
        let settings = Settings {
            store_url: Some("https://abc.supabase.co".to_string()),
            store_service_key: Some("service".to_string()),
            ..Settings::default()
        };
        let gate = StoreGate::new(settings);
        assert!(gate.is_available());
        assert_eq!(gate.get_init_error(), None);
    }

    #[test]
    fn test_injected_table_is_available() {
        let gate = StoreGate::with_table(Arc::new(MemoryTable::new()));
        assert!(gate.is_available());
        assert!(gate.get_handle().handle().is_some());
    }

    #[test]
    fn test_unavailable_gate_reports_reason() {
        let gate = StoreGate::unavailable(Unavailable::ClientInit("boom".to_string()));
        assert_eq!(
            gate.get_handle().reason(),
            Some(&Unavailable::ClientInit("boom".to_string()))
        );
        assert_eq!(gate.get_init_error().as_deref(), Some("failed to create store client: boom"));
    }
}
