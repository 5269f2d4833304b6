//! Adapter registry
//!
//! Holds the currently registered venue adapters. An adapter only becomes
//! visible after its connectivity handshake succeeds; a failed handshake
//! leaves the registry exactly as it was.

use crate::error::{GatewayError, Result};
use crate::types::{Credentials, Venue};
use crate::venue::{DexAdapter, EventAdapter, PredictionAdapter, VenueAdapter};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<Venue, Arc<dyn VenueAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct, validate, and publish an adapter for a venue.
    ///
    /// Re-registering replaces the previous adapter atomically; in-flight
    /// calls keep their own handle to the old instance, which drops once
    /// the last of them returns.
    pub async fn register(&self, venue: Venue, credentials: &Credentials) -> Result<()> {
        let adapter = build_adapter(venue, credentials)?;

        adapter.ping().await.map_err(|e| {
            GatewayError::Connectivity(format!("{} handshake failed: {}", venue, e))
        })?;

        self.register_adapter(venue, adapter).await;
        tracing::info!(%venue, "venue registered");
        Ok(())
    }

    /// Publish a pre-built adapter. Used after construction and by tests
    /// installing stubs.
    pub async fn register_adapter(&self, venue: Venue, adapter: Arc<dyn VenueAdapter>) {
        let replaced = self.adapters.write().await.insert(venue, adapter);
        if replaced.is_some() {
            tracing::info!(%venue, "replaced existing adapter");
        }
    }

    pub async fn unregister(&self, venue: Venue) -> Result<()> {
        match self.adapters.write().await.remove(&venue) {
            Some(_) => {
                tracing::info!(%venue, "venue unregistered");
                Ok(())
            }
            None => Err(GatewayError::UnknownVenue(venue)),
        }
    }

    /// Adapter for a venue, or None — never a default.
    pub async fn get(&self, venue: Venue) -> Option<Arc<dyn VenueAdapter>> {
        self.adapters.read().await.get(&venue).cloned()
    }

    pub async fn list(&self) -> Vec<Venue> {
        let mut venues: Vec<Venue> = self.adapters.read().await.keys().copied().collect();
        venues.sort_by_key(|v| v.as_str());
        venues
    }
}

fn build_adapter(venue: Venue, credentials: &Credentials) -> Result<Arc<dyn VenueAdapter>> {
    Ok(match venue {
        Venue::Dex => Arc::new(DexAdapter::new(credentials)?),
        Venue::PredictionMarket => Arc::new(PredictionAdapter::new(credentials)?),
        Venue::EventContract => Arc::new(EventAdapter::new(credentials)?),
    })
}
