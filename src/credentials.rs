//! Credential store boundary
//!
//! The gateway never owns secrets; it looks them up through this
//! capability while constructing an adapter and drops the reference
//! immediately after. Storage and rotation live behind the trait.

use crate::config::VenuesConfig;
use crate::error::{GatewayError, Result};
use crate::types::{Credentials, Venue};
use parking_lot::RwLock;
use std::collections::HashMap;

pub trait CredentialStore: Send + Sync {
    /// Fetch credentials for a venue, or `InvalidCredentials` when none
    /// are stored.
    fn lookup(&self, venue: Venue) -> Result<Credentials>;
}

/// Store backed by the `[venues.*]` sections of config.toml.
pub struct ConfigCredentialStore {
    venues: VenuesConfig,
}

impl ConfigCredentialStore {
    pub fn new(venues: VenuesConfig) -> Self {
        Self { venues }
    }
}

impl CredentialStore for ConfigCredentialStore {
    fn lookup(&self, venue: Venue) -> Result<Credentials> {
        self.venues
            .get(venue)
            .cloned()
            .ok_or_else(|| {
                GatewayError::InvalidCredentials(format!("no credentials stored for {}", venue))
            })
    }
}

/// In-memory store for tests and for credentials registered over the API.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<Venue, Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, venue: Venue, credentials: Credentials) {
        self.entries.write().insert(venue, credentials);
    }

    pub fn remove(&self, venue: Venue) {
        self.entries.write().remove(&venue);
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn lookup(&self, venue: Venue) -> Result<Credentials> {
        self.entries.read().get(&venue).cloned().ok_or_else(|| {
            GatewayError::InvalidCredentials(format!("no credentials stored for {}", venue))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryCredentialStore::new();
        assert!(store.lookup(Venue::Dex).is_err());

        store.insert(
            Venue::Dex,
            Credentials {
                private_key: Some("key".into()),
                ..Default::default()
            },
        );
        let creds = store.lookup(Venue::Dex).unwrap();
        assert_eq!(creds.private_key.as_deref(), Some("key"));

        store.remove(Venue::Dex);
        assert!(store.lookup(Venue::Dex).is_err());
    }

    #[test]
    fn config_store_reports_missing_venue() {
        let store = ConfigCredentialStore::new(VenuesConfig::default());
        let err = store.lookup(Venue::EventContract).unwrap_err();
        assert_eq!(err.kind(), "invalid_credentials");
    }
}
