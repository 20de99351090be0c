use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{
    config::{Config, Endpoints},
    error::ProviderError,
    model::{CurrentConditions, DateRange, GeocodeCandidate, HourlySample, Location},
};

use super::{Geocoder, RetryPolicy, WeatherProvider};

/// Client for the Open-Meteo forecast, archive and geocoding APIs.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    http: Client,
    endpoints: Endpoints,
    retry: RetryPolicy,
    geocoding_results: u8,
}

impl OpenMeteoClient {
    pub fn new(endpoints: Endpoints, retry: RetryPolicy) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .user_agent(concat!("meteo/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            endpoints,
            retry,
            geocoding_results: 5,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        Ok(Self::new(config.endpoints.clone(), config.retry_policy())?
            .with_geocoding_results(config.geocoding_results))
    }

    pub fn with_geocoding_results(mut self, count: u8) -> Self {
        self.geocoding_results = count.max(1);
        self
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        what: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let mut retry = 0;

        loop {
            match self.get_once(url, query).await {
                Ok(body) => {
                    return serde_json::from_str(&body)
                        .map_err(|e| ProviderError::Malformed(format!("{what} response: {e}")));
                }
                Err(err) if err.is_transient() && retry < self.retry.max_retries => {
                    let delay = self.retry.delay_for(retry);
                    warn!(
                        what,
                        attempt = retry + 1,
                        error = %err,
                        "Open-Meteo request failed, retrying in {}ms",
                        delay.as_millis()
                    );
                    sleep(delay).await;
                    retry += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get_once(&self, url: &str, query: &[(&str, String)]) -> Result<String, ProviderError> {
        let res = self.http.get(url).query(query).send().await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                status,
                body: truncate_body(&body),
            });
        }

        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct ForecastCurrent {
    temperature_2m: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    utc_offset_seconds: i32,
    current: Option<ForecastCurrent>,
}

#[derive(Debug, Deserialize)]
struct ArchiveHourly {
    time: Vec<i64>,
    temperature_2m: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    hourly: Option<ArchiveHourly>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResult {
    name: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    admin1: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    // Omitted entirely when nothing matches.
    #[serde(default)]
    results: Vec<GeocodingResult>,
}

#[async_trait]
impl WeatherProvider for OpenMeteoClient {
    async fn current_conditions(
        &self,
        location: Location,
    ) -> Result<CurrentConditions, ProviderError> {
        let parsed: ForecastResponse = self
            .get_json(
                "forecast",
                &self.endpoints.forecast_url,
                &[
                    ("latitude", location.latitude.to_string()),
                    ("longitude", location.longitude.to_string()),
                    ("current", "temperature_2m".to_string()),
                    ("timezone", "auto".to_string()),
                ],
            )
            .await?;

        let temperature_c = parsed
            .current
            .and_then(|c| c.temperature_2m)
            .ok_or_else(|| {
                ProviderError::Malformed("forecast response has no current temperature".into())
            })?;

        Ok(CurrentConditions {
            temperature_c,
            utc_offset_seconds: parsed.utc_offset_seconds,
        })
    }

    async fn hourly_history(
        &self,
        location: Location,
        range: &DateRange,
    ) -> Result<Vec<HourlySample>, ProviderError> {
        let parsed: ArchiveResponse = self
            .get_json(
                "archive",
                &self.endpoints.archive_url,
                &[
                    ("latitude", location.latitude.to_string()),
                    ("longitude", location.longitude.to_string()),
                    ("start_date", range.start.to_string()),
                    ("end_date", range.end.to_string()),
                    ("hourly", "temperature_2m".to_string()),
                    ("timezone", "GMT".to_string()),
                    ("timeformat", "unixtime".to_string()),
                ],
            )
            .await?;

        let hourly = parsed.hourly.ok_or_else(|| {
            ProviderError::Malformed("archive response has no hourly block".into())
        })?;

        build_series(hourly, range)
    }
}

#[async_trait]
impl Geocoder for OpenMeteoClient {
    async fn search(&self, query: &str) -> Result<Vec<GeocodeCandidate>, ProviderError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let parsed: GeocodingResponse = self
            .get_json(
                "geocoding",
                &self.endpoints.geocoding_url,
                &[
                    ("name", query.to_string()),
                    ("count", self.geocoding_results.to_string()),
                    ("language", "en".to_string()),
                    ("format", "json".to_string()),
                ],
            )
            .await?;

        let candidates: Vec<GeocodeCandidate> =
            parsed.results.into_iter().filter_map(candidate_from).collect();

        debug!(query, matches = candidates.len(), "geocoding search finished");
        Ok(candidates)
    }
}

/// One sample per hour of `range`, in order, starting at its first midnight.
fn build_series(
    hourly: ArchiveHourly,
    range: &DateRange,
) -> Result<Vec<HourlySample>, ProviderError> {
    if hourly.time.len() != hourly.temperature_2m.len() {
        return Err(ProviderError::Malformed(format!(
            "archive returned {} timestamps but {} temperatures",
            hourly.time.len(),
            hourly.temperature_2m.len()
        )));
    }

    let expected = range.expected_hours();
    if hourly.time.len() != expected {
        return Err(ProviderError::Malformed(format!(
            "archive returned {} hours for {range}, expected {expected}",
            hourly.time.len()
        )));
    }

    let start = range.start_instant().timestamp();
    let mut samples: Vec<HourlySample> = Vec::with_capacity(expected);

    let rows = hourly.time.into_iter().zip(hourly.temperature_2m);
    for (hour, (ts, temperature_c)) in rows.enumerate() {
        let want = start + hour as i64 * 3600;
        if ts != want {
            return Err(ProviderError::Malformed(format!(
                "archive hour {hour} is at {ts}, expected {want}"
            )));
        }

        let time = DateTime::from_timestamp(ts, 0)
            .ok_or_else(|| ProviderError::Malformed(format!("timestamp {ts} is out of range")))?;
        samples.push(HourlySample { time, temperature_c });
    }

    Ok(samples)
}

/// "Name, Region, Country", skipping the parts the API leaves out.
fn candidate_from(result: GeocodingResult) -> Option<GeocodeCandidate> {
    let location = Location::new(result.latitude?, result.longitude?).ok()?;

    let display_name = [Some(result.name), result.admin1, result.country]
        .into_iter()
        .flatten()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    Some(GeocodeCandidate {
        display_name,
        location,
    })
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}
