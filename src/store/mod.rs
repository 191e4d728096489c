//! Contract for the remote credential table.
//!
//! Every credential lives in a single table of generic rows keyed by
//! `(service_name, credential_type, environment)`. This module defines the
//! row shapes, the filter language the core needs (equality and strict
//! greater-than), and the `CredentialTable` trait the rest of the crate
//! talks to.
//!
//! Implementations:
//! - `RestTable`: the hosted table reached over HTTP (feature `rest`)
//! - `MemoryTable`: an in-process table with failure injection

pub mod error;
pub mod memory;
#[cfg(feature = "rest")]
pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use error::StoreError;
pub use memory::MemoryTable;
#[cfg(feature = "rest")]
pub use rest::RestTable;

/// Table holding every credential row
pub const TABLE_NAME: &str = "api_credentials";

/// Environment written by this crate for all rows
pub const PRODUCTION_ENVIRONMENT: &str = "production";

/// Columns forming the upsert conflict key, in the order the server expects
pub const CONFLICT_KEY: [Column; 3] = [
    Column::ServiceName,
    Column::CredentialType,
    Column::Environment,
];

/// Filterable columns of the credential table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    ServiceName,
    CredentialType,
    Environment,
    IsActive,
    ExpiresAt,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::ServiceName => "service_name",
            Column::CredentialType => "credential_type",
            Column::Environment => "environment",
            Column::IsActive => "is_active",
            Column::ExpiresAt => "expires_at",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(Column, Value),
    /// Strictly greater than. Rows with a null column never match.
    Gt(Column, Value),
}

impl Filter {
    pub fn column(&self) -> Column {
        match self {
            Filter::Eq(column, _) | Filter::Gt(column, _) => *column,
        }
    }
}

/// Conjunction of row predicates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters(Vec<Filter>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: Column, value: impl Into<Value>) -> Self {
        self.0.push(Filter::Eq(column, value.into()));
        self
    }

    pub fn gt(mut self, column: Column, value: impl Into<Value>) -> Self {
        self.0.push(Filter::Gt(column, value.into()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.0.iter()
    }
}

/// A full row as written by an upsert.
///
/// `expires_at` is only sent when set, so upserting a row without it
/// leaves any existing column value untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRow {
    pub service_name: String,
    pub credential_type: String,
    pub credential_value: String,
    pub environment: String,
    pub is_active: bool,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl CredentialRow {
    /// Active production row stamped with `updated_at`
    pub fn active(
        service_name: &str,
        credential_type: &str,
        credential_value: &str,
        updated_at: &str,
    ) -> Self {
        Self {
            service_name: service_name.to_string(),
            credential_type: credential_type.to_string(),
            credential_value: credential_value.to_string(),
            environment: PRODUCTION_ENVIRONMENT.to_string(),
            is_active: true,
            updated_at: updated_at.to_string(),
            expires_at: None,
        }
    }

    pub fn with_expires_at(mut self, expires_at: &str) -> Self {
        self.expires_at = Some(expires_at.to_string());
        self
    }
}

/// Projection returned by `select`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialValue {
    pub credential_type: String,
    pub credential_value: String,
}

/// Columns changed by a filtered `update`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl RowPatch {
    /// Soft-delete patch
    pub fn deactivate(updated_at: &str) -> Self {
        Self {
            is_active: Some(false),
            updated_at: Some(updated_at.to_string()),
        }
    }
}

/// The remote credential table.
///
/// Implementations report transport and server failures as `StoreError`;
/// callers in this crate convert them to absent/false results.
#[async_trait]
pub trait CredentialTable: Send + Sync {
    /// Return `(credential_type, credential_value)` for every matching row
    async fn select(&self, filters: &Filters) -> Result<Vec<CredentialValue>, StoreError>;

    /// Insert or overwrite the row identified by `CONFLICT_KEY`
    async fn upsert(&self, row: &CredentialRow) -> Result<(), StoreError>;

    /// Apply `patch` to every matching row
    async fn update(&self, filters: &Filters, patch: &RowPatch) -> Result<(), StoreError>;
}
