use thiserror::Error;

use crate::gate::Unavailable;
use crate::store::StoreError;

/// Failure classes of the credential core.
///
/// Public operations never return these. They exist so every log line
/// about a failed store interaction names the same categories, and so
/// partial records read the same as failed queries to callers.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Credential store not configured: {0}")]
    ConfigurationAbsent(#[from] Unavailable),

    #[error("Query failed for {service}: {source}")]
    QueryFailure {
        service: String,
        #[source]
        source: StoreError,
    },

    #[error("Write failed for {service}/{credential_type}: {source}")]
    WriteFailure {
        service: String,
        credential_type: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Incomplete record for {service} (missing: {missing:?})")]
    PartialRecord {
        service: String,
        missing: Vec<&'static str>,
    },
}

impl CoreError {
    pub fn query(service: &str, source: StoreError) -> Self {
        Self::QueryFailure {
            service: service.to_string(),
            source,
        }
    }

    pub fn write(service: &str, credential_type: &'static str, source: StoreError) -> Self {
        Self::WriteFailure {
            service: service.to_string(),
            credential_type,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_record() {
        let err = CoreError::write("kis_token", "expires_at", StoreError::RateLimited);
        assert_eq!(
            err.to_string(),
            "Write failed for kis_token/expires_at: Rate limited - please wait before retrying"
        );

        let err = CoreError::PartialRecord {
            service: "kis".to_string(),
            missing: vec!["app_secret"],
        };
        assert_eq!(err.to_string(), "Incomplete record for kis (missing: [\"app_secret\"])");
    }

    #[test]
    fn test_unavailable_converts() {
        let err: CoreError = Unavailable::MissingConfiguration.into();
        assert!(matches!(err, CoreError::ConfigurationAbsent(_)));
    }
}
