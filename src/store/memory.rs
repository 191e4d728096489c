//! In-process credential table.
//!
//! Mirrors the hosted table's semantics closely enough to exercise the
//! managers without a network: conflict-keyed upserts that merge columns,
//! filtered soft-delete updates, and `gt` filters that never match a null
//! column. Failures can be injected per operation.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::{CredentialRow, CredentialTable, CredentialValue, Column, Filter, Filters, RowPatch, StoreError};
use crate::timestamp::parse_timestamp;

#[derive(Debug, Default)]
struct Inner {
    rows: Vec<CredentialRow>,
    failing_upsert_types: HashSet<String>,
    fail_selects: bool,
    fail_updates: bool,
    upsert_calls: usize,
    update_calls: usize,
}

#[derive(Debug, Default)]
pub struct MemoryTable {
    inner: Mutex<Inner>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not wedge the others
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a row verbatim, bypassing upsert merge rules
    pub fn insert_raw(&self, row: CredentialRow) {
        self.lock().rows.push(row);
    }

    /// Snapshot of every stored row, active or not
    pub fn rows(&self) -> Vec<CredentialRow> {
        self.lock().rows.clone()
    }

    /// Find the row for `(service_name, credential_type)` in any environment
    pub fn row(&self, service_name: &str, credential_type: &str) -> Option<CredentialRow> {
        self.lock()
            .rows
            .iter()
            .find(|r| r.service_name == service_name && r.credential_type == credential_type)
            .cloned()
    }

    /// Make every upsert of `credential_type` fail
    pub fn fail_upserts_for(&self, credential_type: &str) {
        self.lock()
            .failing_upsert_types
            .insert(credential_type.to_string());
    }

    pub fn fail_selects(&self, fail: bool) {
        self.lock().fail_selects = fail;
    }

    pub fn fail_updates(&self, fail: bool) {
        self.lock().fail_updates = fail;
    }

    /// Number of upsert calls received, including failed ones
    pub fn upsert_calls(&self) -> usize {
        self.lock().upsert_calls
    }

    /// Number of update calls received, including failed ones
    pub fn update_calls(&self) -> usize {
        self.lock().update_calls
    }

    fn matches(row: &CredentialRow, filters: &Filters) -> bool {
        filters.iter().all(|filter| match filter {
            Filter::Eq(column, expected) => Self::column_value(row, *column) == *expected,
            Filter::Gt(column, bound) => {
                match (Self::column_value(row, *column), bound) {
                    (Value::String(actual), Value::String(bound)) => {
                        Self::timestamp_gt(&actual, bound)
                    }
                    _ => false,
                }
            }
        })
    }

    fn column_value(row: &CredentialRow, column: Column) -> Value {
        match column {
            Column::ServiceName => Value::from(row.service_name.as_str()),
            Column::CredentialType => Value::from(row.credential_type.as_str()),
            Column::Environment => Value::from(row.environment.as_str()),
            Column::IsActive => Value::from(row.is_active),
            Column::ExpiresAt => row
                .expires_at
                .as_deref()
                .map(Value::from)
                .unwrap_or(Value::Null),
        }
    }

    /// Compare as instants, like a timestamptz column. Unparseable values never match.
    fn timestamp_gt(actual: &str, bound: &str) -> bool {
        match (parse_timestamp(actual), parse_timestamp(bound)) {
            (Some(actual), Some(bound)) => actual > bound,
            _ => false,
        }
    }
}

#[async_trait]
impl CredentialTable for MemoryTable {
    async fn select(&self, filters: &Filters) -> Result<Vec<CredentialValue>, StoreError> {
        let inner = self.lock();
        if inner.fail_selects {
            return Err(StoreError::Injected("select".to_string()));
        }
        Ok(inner
            .rows
            .iter()
            .filter(|row| Self::matches(row, filters))
            .map(|row| CredentialValue {
                credential_type: row.credential_type.clone(),
                credential_value: row.credential_value.clone(),
            })
            .collect())
    }

    async fn upsert(&self, row: &CredentialRow) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.upsert_calls += 1;
        if inner.failing_upsert_types.contains(&row.credential_type) {
            return Err(StoreError::Injected(format!("upsert {}", row.credential_type)));
        }

        let position = inner.rows.iter().position(|r| {
            r.service_name == row.service_name
                && r.credential_type == row.credential_type
                && r.environment == row.environment
        });

        match position {
            Some(index) => {
                let existing = &mut inner.rows[index];
                existing.credential_value = row.credential_value.clone();
                existing.is_active = row.is_active;
                existing.updated_at = row.updated_at.clone();
                // Merge semantics: omitted columns keep their value
                if row.expires_at.is_some() {
                    existing.expires_at = row.expires_at.clone();
                }
            }
            None => inner.rows.push(row.clone()),
        }
        Ok(())
    }

    async fn update(&self, filters: &Filters, patch: &RowPatch) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.update_calls += 1;
        if inner.fail_updates {
            return Err(StoreError::Injected("update".to_string()));
        }

        for row in inner.rows.iter_mut().filter(|r| Self::matches(r, filters)) {
            if let Some(is_active) = patch.is_active {
                row.is_active = is_active;
            }
            if let Some(ref updated_at) = patch.updated_at {
                row.updated_at = updated_at.clone();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: &str = "2025-01-01T00:00:00+00:00";

    #[tokio::test]
    async fn test_upsert_overwrites_in_place() {
        let table = MemoryTable::new();
        table
            .upsert(&CredentialRow::active("kis", "app_key", "old", NOW))
            .await
            .unwrap();
        table
            .upsert(&CredentialRow::active("kis", "app_key", "new", NOW))
            .await
            .unwrap();

        let rows = table.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].credential_value, "new");
    }

    #[tokio::test]
    async fn test_upsert_without_expiry_keeps_existing_column() {
        let table = MemoryTable::new();
        table
            .upsert(&CredentialRow::active("kis", "app_key", "a", NOW).with_expires_at(NOW))
            .await
            .unwrap();
        table
            .upsert(&CredentialRow::active("kis", "app_key", "b", NOW))
            .await
            .unwrap();

        assert_eq!(table.row("kis", "app_key").unwrap().expires_at.as_deref(), Some(NOW));
    }

    #[tokio::test]
    async fn test_gt_filter_excludes_null_and_past() {
        let table = MemoryTable::new();
        table.insert_raw(CredentialRow::active("kis_token", "legacy", "x", NOW));
        table.insert_raw(
            CredentialRow::active("kis_token", "past", "x", NOW).with_expires_at("2024-06-01T00:00:00Z"),
        );
        table.insert_raw(
            CredentialRow::active("kis_token", "future", "x", NOW).with_expires_at("2099-01-01T09:00:00+09:00"),
        );

        let filters = Filters::new().gt(Column::ExpiresAt, "2025-01-01T00:00:00Z");
        let rows = table.select(&filters).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].credential_type, "future");
    }

    #[tokio::test]
    async fn test_gt_reads_offsetless_expiry_as_utc() {
        let table = MemoryTable::new();
        table.insert_raw(
            CredentialRow::active("kis_token", "naive", "x", NOW).with_expires_at("2025-01-01T00:00:01"),
        );
        let filters = Filters::new().gt(Column::ExpiresAt, "2025-01-01T00:00:00+00:00");
        assert_eq!(table.select(&filters).await.unwrap().len(), 1);

        let filters = Filters::new().gt(Column::ExpiresAt, "2025-01-01T00:00:01+00:00");
        assert!(table.select(&filters).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gt_is_strict() {
        let table = MemoryTable::new();
        table.insert_raw(
            CredentialRow::active("kis_token", "edge", "x", NOW).with_expires_at("2025-01-01T00:00:00Z"),
        );
        let filters = Filters::new().gt(Column::ExpiresAt, "2025-01-01T00:00:00Z");
        assert!(table.select(&filters).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_applies_patch_to_matching_rows() {
        let table = MemoryTable::new();
        table.insert_raw(CredentialRow::active("kis_token", "access_token", "t", NOW));
        table.insert_raw(CredentialRow::active("kis", "app_key", "k", NOW));

        table
            .update(
                &Filters::new().eq(Column::ServiceName, "kis_token"),
                &RowPatch::deactivate("2025-02-01T00:00:00Z"),
            )
            .await
            .unwrap();

        let token_row = table.row("kis_token", "access_token").unwrap();
        assert!(!token_row.is_active);
        assert_eq!(token_row.updated_at, "2025-02-01T00:00:00Z");
        assert!(table.row("kis", "app_key").unwrap().is_active);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let table = MemoryTable::new();
        table.fail_upserts_for("app_secret");
        table.fail_selects(true);
        table.fail_updates(true);

        assert!(table
            .upsert(&CredentialRow::active("kis", "app_key", "k", NOW))
            .await
            .is_ok());
        assert!(table
            .upsert(&CredentialRow::active("kis", "app_secret", "s", NOW))
            .await
            .is_err());
        assert!(table.select(&Filters::new()).await.is_err());
        assert!(table.update(&Filters::new(), &RowPatch::default()).await.is_err());
        assert_eq!(table.upsert_calls(), 2);
        assert_eq!(table.update_calls(), 1);
    }
}
