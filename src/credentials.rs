//! Static API key pairs held in the credential store.
//!
//! A pair is two rows under one service: `app_key` and `app_secret`.
//! Callers only ever see both halves or nothing.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::CoreError;
use crate::gate::StoreGate;
use crate::record::RecordState;
use crate::store::{Column, CredentialRow, Filters};

/// Service name of the brokerage API key pair
pub const KIS_SERVICE: &str = "kis";

pub const APP_KEY: &str = "app_key";
pub const APP_SECRET: &str = "app_secret";

const PAIR_FIELDS: [&str; 2] = [APP_KEY, APP_SECRET];

#[derive(Clone, PartialEq, Eq)]
pub struct ApiKeyPair {
    pub app_key: String,
    pub app_secret: String,
}

impl ApiKeyPair {
    pub fn new(app_key: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            app_secret: app_secret.into(),
        }
    }

    /// Key with all but the first four characters hidden, for display
    pub fn masked_key(&self) -> String {
        let visible: String = self.app_key.chars().take(4).collect();
        format!("{}****", visible)
    }
}

impl std::fmt::Debug for ApiKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyPair")
            .field("app_key", &self.masked_key())
            .field("app_secret", &"<redacted>")
            .finish()
    }
}

/// Reads and writes key pairs through the store gate.
/// Clone is cheap - the gate is shared.
#[derive(Clone)]
pub struct CredentialManager {
    gate: Arc<StoreGate>,
}

impl CredentialManager {
    pub fn new(gate: Arc<StoreGate>) -> Self {
        Self { gate }
    }

    pub fn gate(&self) -> &StoreGate {
        &self.gate
    }

    pub fn is_available(&self) -> bool {
        self.gate.is_available()
    }

    /// Read the active pair for `service`, keeping partial results distinguishable
    pub async fn read_credentials(&self, service: &str) -> RecordState<ApiKeyPair> {
        let capability = self.gate.get_handle();
        let Some(table) = capability.handle() else {
            return RecordState::Absent;
        };

        let filters = Filters::new()
            .eq(Column::ServiceName, service)
            .eq(Column::IsActive, true);

        match table.select(&filters).await {
            Ok(rows) => RecordState::from_rows(rows, &PAIR_FIELDS, |fields| {
                ApiKeyPair::new(fields.take(APP_KEY), fields.take(APP_SECRET))
            }),
            Err(e) => {
                let err = CoreError::query(service, e);
                warn!(error = %err, "Credential lookup failed");
                RecordState::Absent
            }
        }
    }

    /// Active pair for `service`, or `None` if missing, incomplete or unreadable
    pub async fn get_credentials(&self, service: &str) -> Option<ApiKeyPair> {
        self.read_credentials(service).await.into_complete(service)
    }

    pub async fn get_kis_credentials(&self) -> Option<ApiKeyPair> {
        self.get_credentials(KIS_SERVICE).await
    }

    /// Overwrite the stored pair, reactivating both rows.
    ///
    /// The two rows are written independently. If the second write fails
    /// the first stays updated; there is no joint rollback.
    pub async fn update_credentials(&self, app_key: &str, app_secret: &str) -> bool {
        let capability = self.gate.get_handle();
        let Some(table) = capability.handle() else {
            return false;
        };

        let now = Utc::now().to_rfc3339();
        for (credential_type, value) in [(APP_KEY, app_key), (APP_SECRET, app_secret)] {
            let row = CredentialRow::active(KIS_SERVICE, credential_type, value, &now);
            if let Err(e) = table.upsert(&row).await {
                let err = CoreError::write(KIS_SERVICE, credential_type, e);
                warn!(error = %err, "Failed to update API key pair");
                return false;
            }
        }

        info!(service = KIS_SERVICE, "API key pair synced to credential store");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Unavailable;
    use crate::store::{MemoryTable, PRODUCTION_ENVIRONMENT};

    const NOW: &str = "2025-01-01T00:00:00+00:00";

    fn manager() -> (CredentialManager, Arc<MemoryTable>) {
        let table = Arc::new(MemoryTable::new());
        let gate = Arc::new(StoreGate::with_table(table.clone()));
        (CredentialManager::new(gate), table)
    }

    #[tokio::test]
    async fn test_update_then_get_round_trips() {
        let (manager, table) = manager();
        assert!(manager.update_credentials("KEY-1", "SECRET-1").await);

        let pair = manager.get_kis_credentials().await.expect("pair stored");
        assert_eq!(pair, ApiKeyPair::new("KEY-1", "SECRET-1"));

        let row = table.row(KIS_SERVICE, APP_KEY).expect("row written");
        assert_eq!(row.environment, PRODUCTION_ENVIRONMENT);
        assert!(row.is_active);
        assert!(row.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_update_reactivates_and_overwrites() {
        let (manager, table) = manager();
        let mut stale = CredentialRow::active(KIS_SERVICE, APP_KEY, "OLD", NOW);
        stale.is_active = false;
        table.insert_raw(stale);

        assert!(manager.update_credentials("NEW", "S").await);
        let rows = table.rows();
        assert_eq!(rows.len(), 2);
        let key_row = table.row(KIS_SERVICE, APP_KEY).unwrap();
        assert_eq!(key_row.credential_value, "NEW");
        assert!(key_row.is_active);
        assert_ne!(key_row.updated_at, NOW);
    }

    #[tokio::test]
    async fn test_lone_key_is_absent() {
        let (manager, table) = manager();
        table.insert_raw(CredentialRow::active(KIS_SERVICE, APP_KEY, "K", NOW));

        assert_eq!(
            manager.read_credentials(KIS_SERVICE).await,
            RecordState::Partial { missing: vec![APP_SECRET] }
        );
        assert_eq!(manager.get_kis_credentials().await, None);
    }

    #[tokio::test]
    async fn test_lone_secret_is_absent() {
        let (manager, table) = manager();
        table.insert_raw(CredentialRow::active(KIS_SERVICE, APP_SECRET, "S", NOW));
        assert_eq!(manager.get_kis_credentials().await, None);
    }

    #[tokio::test]
    async fn test_inactive_row_breaks_pair() {
        let (manager, table) = manager();
        table.insert_raw(CredentialRow::active(KIS_SERVICE, APP_KEY, "K", NOW));
        let mut secret = CredentialRow::active(KIS_SERVICE, APP_SECRET, "S", NOW);
        secret.is_active = false;
        table.insert_raw(secret);

        assert_eq!(manager.get_kis_credentials().await, None);
    }

    #[tokio::test]
    async fn test_other_service_rows_are_ignored() {
        let (manager, table) = manager();
        table.insert_raw(CredentialRow::active("other", APP_KEY, "K", NOW));
        table.insert_raw(CredentialRow::active("other", APP_SECRET, "S", NOW));

        assert_eq!(manager.get_kis_credentials().await, None);
        assert_eq!(
            manager.get_credentials("other").await,
            Some(ApiKeyPair::new("K", "S"))
        );
    }

    #[tokio::test]
    async fn test_query_failure_is_absent() {
        let (manager, table) = manager();
        assert!(manager.update_credentials("K", "S").await);
        table.fail_selects(true);
        assert_eq!(manager.get_kis_credentials().await, None);
    }

    #[tokio::test]
    async fn test_second_upsert_failure_leaves_first_written() {
        let (manager, table) = manager();
        table.insert_raw(CredentialRow::active(KIS_SERVICE, APP_SECRET, "OLD-SECRET", NOW));
        table.fail_upserts_for(APP_SECRET);

        assert!(!manager.update_credentials("NEW-KEY", "NEW-SECRET").await);
        // No joint rollback: the key is updated, the secret is stale
        assert_eq!(table.row(KIS_SERVICE, APP_KEY).unwrap().credential_value, "NEW-KEY");
        assert_eq!(table.row(KIS_SERVICE, APP_SECRET).unwrap().credential_value, "OLD-SECRET");
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let gate = Arc::new(StoreGate::unavailable(Unavailable::MissingConfiguration));
        let manager = CredentialManager::new(gate);
        assert!(!manager.is_available());
        assert_eq!(manager.get_kis_credentials().await, None);
        assert!(!manager.update_credentials("K", "S").await);
    }

    #[test]
    fn test_debug_hides_secret() {
        let pair = ApiKeyPair::new("PSabcdef", "topsecret");
        let debug = format!("{:?}", pair);
        assert!(debug.contains("PSab****"));
        assert!(!debug.contains("topsecret"));
        assert!(!debug.contains("PSabcdef"));
    }
}
