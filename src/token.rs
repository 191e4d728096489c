//! Cached brokerage access tokens.
//!
//! A token is stored as three rows under the `kis_token` service:
//! `access_token`, `expires_at` and `issued_at`. Every row of one save
//! also carries the expiry in the table's `expires_at` column, so expired
//! tokens can be filtered out by the store itself.
//!
//! Concurrent saves are not coordinated. Two refreshes racing each other
//! can interleave their rows.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use crate::error::CoreError;
use crate::gate::{StoreGate, StoreHandle};
use crate::record::RecordState;
use crate::store::{Column, CredentialRow, Filters, RowPatch, PRODUCTION_ENVIRONMENT};
use crate::timestamp::parse_timestamp;

/// Service name of the cached access token
pub const TOKEN_SERVICE: &str = "kis_token";

pub const ACCESS_TOKEN: &str = "access_token";
pub const EXPIRES_AT: &str = "expires_at";
pub const ISSUED_AT: &str = "issued_at";

/// Rows of one token record, in write order
const TOKEN_FIELDS: [&str; 3] = [ACCESS_TOKEN, EXPIRES_AT, ISSUED_AT];

/// Buffer time before expiry to trigger refresh (5 minutes)
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Source of the current time
pub type Clock = fn() -> DateTime<Utc>;

#[derive(Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub access_token: String,
    pub expires_at: String,
    pub issued_at: String,
}

impl TokenRecord {
    /// Parse `expires_at`. Offset-less values are taken as UTC.
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.expires_at)
    }

    /// Unparseable expiry counts as expired
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at_utc().map(|expiry| now >= expiry).unwrap_or(true)
    }

    /// Check if the token will expire soon and should be refreshed
    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at_utc()
            .map(|expiry| now >= expiry - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES))
            .unwrap_or(true)
    }

    /// Minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.expires_at_utc()
            .map(|expiry| (expiry - now).num_minutes().max(0))
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

pub struct TokenCache {
    gate: Arc<StoreGate>,
    clock: Clock,
}

impl TokenCache {
    pub fn new(gate: Arc<StoreGate>) -> Self {
        Self {
            gate,
            clock: Utc::now,
        }
    }

    /// Replace the clock used for expiry filters and `updated_at`
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn table(&self) -> Option<StoreHandle> {
        self.gate.get_handle().handle().cloned()
    }

    fn active_token_rows() -> Filters {
        Filters::new()
            .eq(Column::ServiceName, TOKEN_SERVICE)
            .eq(Column::IsActive, true)
    }

    async fn read(&self, filters: Filters) -> RecordState<TokenRecord> {
        let Some(table) = self.table() else {
            return RecordState::Absent;
        };

        match table.select(&filters).await {
            Ok(rows) => RecordState::from_rows(rows, &TOKEN_FIELDS, |fields| TokenRecord {
                access_token: fields.take(ACCESS_TOKEN),
                expires_at: fields.take(EXPIRES_AT),
                issued_at: fields.take(ISSUED_AT),
            }),
            Err(e) => {
                let err = CoreError::query(TOKEN_SERVICE, e);
                warn!(error = %err, "Token lookup failed");
                RecordState::Absent
            }
        }
    }

    /// Active token regardless of expiry.
    ///
    /// Also returns records written before rows carried an expiry column.
    pub async fn get_token(&self) -> Option<TokenRecord> {
        self.read(Self::active_token_rows())
            .await
            .into_complete(TOKEN_SERVICE)
    }

    /// Active token whose `expires_at` column is strictly in the future.
    ///
    /// Rows with no expiry column never match; use `get_token` or
    /// `get_usable_token` to accept such records.
    pub async fn get_valid_token(&self) -> Option<TokenRecord> {
        let filters = Self::active_token_rows().gt(Column::ExpiresAt, self.now().to_rfc3339());
        self.read(filters).await.into_complete(TOKEN_SERVICE)
    }

    /// Valid token, falling back to an unfiltered read whose own
    /// `expires_at` value is still in the future
    pub async fn get_usable_token(&self) -> Option<TokenRecord> {
        if let Some(token) = self.get_valid_token().await {
            return Some(token);
        }

        let token = self.get_token().await?;
        if token.is_expired_at(self.now()) {
            return None;
        }
        info!("Using token record without expiry column");
        Some(token)
    }

    /// Store a token as three rows sharing one expiry.
    ///
    /// If a row fails to write, rows already written by this call are
    /// deactivated and `false` is returned. A crash between writes can
    /// still leave a partially updated record.
    pub async fn save_token(&self, access_token: &str, expires_at: &str, issued_at: &str) -> bool {
        let Some(table) = self.table() else {
            return false;
        };

        let now = self.now().to_rfc3339();
        let mut saved: Vec<&'static str> = Vec::with_capacity(TOKEN_FIELDS.len());

        for (credential_type, value) in [
            (ACCESS_TOKEN, access_token),
            (EXPIRES_AT, expires_at),
            (ISSUED_AT, issued_at),
        ] {
            let row = CredentialRow::active(TOKEN_SERVICE, credential_type, value, &now)
                .with_expires_at(expires_at);

            if let Err(e) = table.upsert(&row).await {
                let err = CoreError::write(TOKEN_SERVICE, credential_type, e);
                warn!(error = %err, "Failed to save token");
                Self::rollback(&table, &saved, &now).await;
                return false;
            }
            saved.push(credential_type);
        }

        info!(expires_at = %expires_at, "Access token saved");
        true
    }

    /// Deactivate the rows written earlier in a failed save.
    /// Failures are logged; each row is attempted.
    async fn rollback(table: &StoreHandle, saved: &[&'static str], now: &str) {
        if saved.is_empty() {
            return;
        }

        let patch = RowPatch::deactivate(now);
        let mut rolled_back = Vec::with_capacity(saved.len());
        for credential_type in saved {
            let filters = Filters::new()
                .eq(Column::ServiceName, TOKEN_SERVICE)
                .eq(Column::CredentialType, *credential_type)
                .eq(Column::Environment, PRODUCTION_ENVIRONMENT);

            match table.update(&filters, &patch).await {
                Ok(()) => rolled_back.push(*credential_type),
                Err(e) => {
                    error!(credential_type = *credential_type, error = %e, "Token rollback failed");
                }
            }
        }

        info!(rolled_back = ?rolled_back, "Rolled back incomplete token");
    }

    /// Deactivate every token row
    pub async fn invalidate_token(&self) -> bool {
        let Some(table) = self.table() else {
            return false;
        };

        let filters = Filters::new().eq(Column::ServiceName, TOKEN_SERVICE);
        let patch = RowPatch::deactivate(&self.now().to_rfc3339());

        match table.update(&filters, &patch).await {
            Ok(()) => {
                info!("Access token invalidated");
                true
            }
            Err(e) => {
                let err = CoreError::write(TOKEN_SERVICE, ACCESS_TOKEN, e);
                warn!(error = %err, "Failed to invalidate token");
                false
            }
        }
    }
}
