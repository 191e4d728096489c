//! Reassembly of multi-row records.
//!
//! A logical record (a key pair, a token) is stored as one row per field.
//! Reads collect the selected rows once into a `RecordState` so callers
//! can tell a complete record from a partial or missing one.

use std::collections::HashMap;

use tracing::warn;

use crate::error::CoreError;
use crate::store::CredentialValue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordState<T> {
    Complete(T),
    /// Some rows exist but required fields are missing
    Partial { missing: Vec<&'static str> },
    Absent,
}

impl<T> RecordState<T> {
    /// Assemble a record from selected rows.
    ///
    /// `build` runs only when every `required` field is present.
    pub fn from_rows(
        rows: Vec<CredentialValue>,
        required: &[&'static str],
        build: impl FnOnce(&mut Fields) -> T,
    ) -> Self {
        if rows.is_empty() {
            return RecordState::Absent;
        }

        let mut fields = Fields(
            rows.into_iter()
                .map(|row| (row.credential_type, row.credential_value))
                .collect(),
        );

        let missing: Vec<&'static str> = required
            .iter()
            .copied()
            .filter(|name| !fields.0.contains_key(*name))
            .collect();

        if missing.is_empty() {
            RecordState::Complete(build(&mut fields))
        } else {
            RecordState::Partial { missing }
        }
    }

    /// Collapse to the caller-visible result, logging incomplete records
    pub fn into_complete(self, service: &str) -> Option<T> {
        match self {
            RecordState::Complete(record) => Some(record),
            RecordState::Partial { missing } => {
                let err = CoreError::PartialRecord {
                    service: service.to_string(),
                    missing,
                };
                warn!(error = %err, "Ignoring incomplete credential record");
                None
            }
            RecordState::Absent => None,
        }
    }
}

/// Field values of one record, keyed by `credential_type`
#[derive(Debug, Default)]
pub struct Fields(HashMap<String, String>);

impl Fields {
    /// Take a field's value, empty if absent
    pub fn take(&mut self, name: &str) -> String {
        self.0.remove(name).unwrap_or_default()
    }
}
