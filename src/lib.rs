//! Credential and access-token management for the KIS data pipeline.
//!
//! This crate provides:
//! - `StoreGate`: once-per-process connection to the credential store
//! - `CredentialManager`: the static API key pair held in the store
//! - `TokenCache`: short-lived access tokens with expiry-aware reads
//! - `FallbackResolver`: store-then-environment key resolution and sync
//!
//! Construct one `StoreGate` at startup and hand clones of its `Arc` to
//! the components that need it.

pub mod config;
pub mod credentials;
pub mod error;
pub mod fallback;
pub mod gate;
pub mod record;
pub mod store;
pub mod timestamp;
pub mod token;

pub use config::Settings;
pub use credentials::{ApiKeyPair, CredentialManager};
pub use error::CoreError;
pub use fallback::{CredentialSource, FallbackResolver, ResolvedCredentials};
pub use gate::{Capability, StoreGate, StoreHandle, Unavailable};
pub use record::RecordState;
pub use store::{CredentialTable, StoreError};
pub use token::{TokenCache, TokenRecord};
