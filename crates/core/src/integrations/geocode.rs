//! Geocoding provider interface

use async_trait::async_trait;

use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostalAddress {
    pub address_line: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    /// Best-effort reverse geocode; `None` when nothing is known.
    async fn reverse_geocode(&self, lat: f64, lon: f64) -> Result<Option<PostalAddress>>;
}

/// Stand-in that never resolves an address.
pub struct StubGeocodingProvider;

#[async_trait]
impl GeocodingProvider for StubGeocodingProvider {
    async fn reverse_geocode(&self, _lat: f64, _lon: f64) -> Result<Option<PostalAddress>> {
        Ok(None)
    }
}
