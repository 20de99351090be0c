use async_trait::async_trait;
use std::{fmt::Debug, time::Duration};

use crate::{
    error::ProviderError,
    model::{CurrentConditions, DateRange, GeocodeCandidate, HourlySample, Location},
};

pub mod openmeteo;

pub use openmeteo::OpenMeteoClient;

/// Source of truth for current and archived observations.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn current_conditions(
        &self,
        location: Location,
    ) -> Result<CurrentConditions, ProviderError>;

    /// Hourly samples covering `range`, ascending by time.
    async fn hourly_history(
        &self,
        location: Location,
        range: &DateRange,
    ) -> Result<Vec<HourlySample>, ProviderError>;
}

/// Free-text place search. No match is an empty list, not an error.
#[async_trait]
pub trait Geocoder: Send + Sync + Debug {
    async fn search(&self, query: &str) -> Result<Vec<GeocodeCandidate>, ProviderError>;
}

/// Bounded exponential backoff for transient upstream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based), with up to 25% jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(16));
        let delay = self.base_delay.saturating_mul(factor);
        delay.saturating_add(delay.mul_f32(fastrand::f32() * 0.25))
    }
}
