//! Integration adapters
//!
//! Weather, geocoding and SIM-carrier providers sit behind narrow async
//! traits. The process owns one `Arc<dyn ...>` instance of each; the stub
//! implementations here return deterministic data and stand in for the
//! real vendors.

mod geocode;
mod sim;
mod weather;

pub use geocode::{GeocodingProvider, PostalAddress, StubGeocodingProvider};
pub use sim::{SimAction, SimActionKind, SimProvider, StubSimProvider};
pub use weather::{StubWeatherProvider, WeatherProvider};
