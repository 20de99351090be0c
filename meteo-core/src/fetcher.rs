//! Read-through access to weather readings.
//!
//! [`WeatherService`] is the one place that decides whether a reading comes
//! from the cache or from upstream. A miss (or a stale hit) calls the
//! provider, appends the result to the store and returns it; provider
//! failures propagate and leave the store untouched.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    config::Config,
    error::{Error, Result},
    model::{
        CurrentConditions, DateRange, GeocodeCandidate, HourlySample, Location, ObservationKind,
        Reading, ReadingValue,
    },
    policy::FreshnessPolicy,
    provider::{Geocoder, OpenMeteoClient, WeatherProvider},
    store::CacheStore,
};

pub struct WeatherService {
    store: CacheStore,
    provider: Arc<dyn WeatherProvider>,
    geocoder: Arc<dyn Geocoder>,
    policy: FreshnessPolicy,
}

impl WeatherService {
    pub fn new(
        store: CacheStore,
        provider: Arc<dyn WeatherProvider>,
        geocoder: Arc<dyn Geocoder>,
        policy: FreshnessPolicy,
    ) -> Self {
        Self {
            store,
            provider,
            geocoder,
            policy,
        }
    }

    /// Open the configured cache database and Open-Meteo client.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let path = config.database_path()?;
        let store = CacheStore::open(&path).await?;
        let client = Arc::new(OpenMeteoClient::from_config(config).map_err(Error::from)?);

        Ok(Self::new(store, client.clone(), client, config.freshness_policy()))
    }

    pub async fn close(self) {
        self.store.close().await;
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn policy(&self) -> &FreshnessPolicy {
        &self.policy
    }

    /// Cached reading if one is fresh at `now`, otherwise a new one from upstream.
    pub async fn fetch(
        &self,
        location: Location,
        kind: ObservationKind,
        now: DateTime<Utc>,
    ) -> Result<Reading> {
        let window = self.policy.window(&kind);

        if let Some(reading) = self.store.get_fresh(location, &kind, window, now).await? {
            debug!(%location, %kind, observed_at = %reading.observed_at, "cache hit");
            return Ok(reading);
        }

        debug!(%location, %kind, "cache miss, calling provider");

        let value = match &kind {
            ObservationKind::CurrentTemperature => {
                ReadingValue::Current(self.provider.current_conditions(location).await?)
            }
            ObservationKind::HistoricalSeries(range) => {
                ReadingValue::Series(self.provider.hourly_history(location, range).await?)
            }
        };

        let reading = self.store.put(location, &kind, &value, now).await?;
        info!(%location, %kind, "fetched fresh reading");
        Ok(reading)
    }

    pub async fn current(&self, location: Location, now: DateTime<Utc>) -> Result<CurrentConditions> {
        let reading = self.fetch(location, ObservationKind::CurrentTemperature, now).await?;
        match reading.value {
            ReadingValue::Current(current) => Ok(current),
            ReadingValue::Series(_) => Err(Error::InvalidReading(
                "current lookup returned a series".into(),
            )),
        }
    }

    pub async fn history(
        &self,
        location: Location,
        range: DateRange,
        now: DateTime<Utc>,
    ) -> Result<Vec<HourlySample>> {
        let reading = self
            .fetch(location, ObservationKind::HistoricalSeries(range), now)
            .await?;
        match reading.value {
            ReadingValue::Series(samples) => Ok(samples),
            ReadingValue::Current(_) => Err(Error::InvalidReading(
                "historical lookup returned current conditions".into(),
            )),
        }
    }

    /// Location search; results are never cached.
    pub async fn search(&self, query: &str) -> Result<Vec<GeocodeCandidate>> {
        Ok(self.geocoder.search(query).await?)
    }
}
