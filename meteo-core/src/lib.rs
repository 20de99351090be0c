//! Core library for the `meteo` weather dashboard.
//!
//! This crate defines:
//! - A persistent, append-only cache of weather readings
//! - The read-through policy deciding when to call upstream
//! - Open-Meteo forecast, archive and geocoding clients
//! - Configuration & shared domain models
//!
//! It is used by `meteo-cli`, but can also be reused by other binaries or services.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod policy;
pub mod provider;
pub mod store;

pub use config::{Config, Endpoints, RetryConfig};
pub use error::{Error, ProviderError, Result};
pub use fetcher::WeatherService;
pub use model::{
    CurrentConditions, DateRange, GeocodeCandidate, HourlySample, Location, ObservationKind,
    Reading, ReadingValue,
};
pub use policy::{Freshness, FreshnessPolicy};
pub use provider::{Geocoder, OpenMeteoClient, RetryPolicy, WeatherProvider};
pub use store::CacheStore;
