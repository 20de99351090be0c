//! Durable, append-only storage of readings.
//!
//! Current conditions and historical series live in separate tables; both
//! keep every write and answer lookups with the newest row that is still
//! inside the caller's freshness window.

use chrono::{DateTime, TimeZone, Utc};
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};
use std::{path::Path, str::FromStr, time::Duration};
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    model::{CurrentConditions, HourlySample, Location, ObservationKind, Reading, ReadingValue},
    policy::Freshness,
};

pub struct CacheStore {
    pool: SqlitePool,
}

impl CacheStore {
    /// Open (or create) the cache database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_tables().await?;

        info!(path = %path.display(), "opened weather cache");
        Ok(store)
    }

    /// A private database that disappears with the store.
    pub async fn open_in_memory() -> Result<Self> {
        // Every connection to `:memory:` is its own database, so pin exactly one.
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS current_readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                temperature REAL NOT NULL,
                utc_offset_seconds INTEGER NOT NULL,
                observed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS historical_series (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                samples TEXT NOT NULL,
                observed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_current_key \
             ON current_readings(latitude, longitude, observed_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_historical_key \
             ON historical_series(latitude, longitude, start_date, end_date, observed_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append a reading. Earlier readings for the same key are kept.
    pub async fn put(
        &self,
        location: Location,
        kind: &ObservationKind,
        value: &ReadingValue,
        observed_at: DateTime<Utc>,
    ) -> Result<Reading> {
        let stamp = observed_at.timestamp_nanos_opt().ok_or_else(|| {
            Error::InvalidReading(format!("timestamp {observed_at} cannot be stored"))
        })?;

        match (kind, value) {
            (ObservationKind::CurrentTemperature, ReadingValue::Current(current)) => {
                if !current.temperature_c.is_finite() {
                    return Err(Error::InvalidReading(format!(
                        "temperature {} is not a finite number",
                        current.temperature_c
                    )));
                }

                sqlx::query(
                    r#"
                    INSERT INTO current_readings (
                        latitude, longitude, temperature, utc_offset_seconds, observed_at
                    )
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(location.latitude)
                .bind(location.longitude)
                .bind(current.temperature_c)
                .bind(current.utc_offset_seconds)
                .bind(stamp)
                .execute(&self.pool)
                .await?;
            }
            (ObservationKind::HistoricalSeries(range), ReadingValue::Series(samples)) => {
                let encoded = serde_json::to_string(samples)
                    .map_err(|e| Error::InvalidReading(e.to_string()))?;

                sqlx::query(
                    r#"
                    INSERT INTO historical_series (
                        latitude, longitude, start_date, end_date, samples, observed_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(location.latitude)
                .bind(location.longitude)
                .bind(range.start.to_string())
                .bind(range.end.to_string())
                .bind(encoded)
                .bind(stamp)
                .execute(&self.pool)
                .await?;
            }
            (kind, _) => {
                return Err(Error::InvalidReading(format!(
                    "value does not match observation kind {kind}"
                )));
            }
        }

        debug!(%location, %kind, %observed_at, "stored reading");

        Ok(Reading {
            location,
            kind: *kind,
            value: value.clone(),
            observed_at,
        })
    }

    /// Newest reading for the key whose `observed_at` falls inside `freshness` at `now`.
    pub async fn get_fresh(
        &self,
        location: Location,
        kind: &ObservationKind,
        freshness: Freshness,
        now: DateTime<Utc>,
    ) -> Result<Option<Reading>> {
        let cutoff = freshness.cutoff(now).map_or(i64::MIN, nanos_floor);

        let row = match kind {
            ObservationKind::CurrentTemperature => {
                sqlx::query(
                    r#"
                    SELECT temperature, utc_offset_seconds, observed_at
                    FROM current_readings
                    WHERE latitude = $1 AND longitude = $2 AND observed_at >= $3
                    ORDER BY observed_at DESC, id DESC
                    LIMIT 1
                    "#,
                )
                .bind(location.latitude)
                .bind(location.longitude)
                .bind(cutoff)
                .fetch_optional(&self.pool)
                .await?
            }
            ObservationKind::HistoricalSeries(range) => {
                sqlx::query(
                    r#"
                    SELECT samples, observed_at
                    FROM historical_series
                    WHERE latitude = $1 AND longitude = $2
                      AND start_date = $3 AND end_date = $4
                      AND observed_at >= $5
                    ORDER BY observed_at DESC, id DESC
                    LIMIT 1
                    "#,
                )
                .bind(location.latitude)
                .bind(location.longitude)
                .bind(range.start.to_string())
                .bind(range.end.to_string())
                .bind(cutoff)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.map(|row| decode_reading(location, kind, &row)).transpose()
    }

    /// Number of readings kept for a key, fresh or not.
    pub async fn count(&self, location: Location, kind: &ObservationKind) -> Result<i64> {
        let count: i64 = match kind {
            ObservationKind::CurrentTemperature => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM current_readings WHERE latitude = $1 AND longitude = $2",
                )
                .bind(location.latitude)
                .bind(location.longitude)
                .fetch_one(&self.pool)
                .await?
            }
            ObservationKind::HistoricalSeries(range) => {
                sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*) FROM historical_series
                    WHERE latitude = $1 AND longitude = $2 AND start_date = $3 AND end_date = $4
                    "#,
                )
                .bind(location.latitude)
                .bind(location.longitude)
                .bind(range.start.to_string())
                .bind(range.end.to_string())
                .fetch_one(&self.pool)
                .await?
            }
        };

        Ok(count)
    }
}

fn decode_reading(location: Location, kind: &ObservationKind, row: &SqliteRow) -> Result<Reading> {
    let observed_at = Utc.timestamp_nanos(row.try_get::<i64, _>("observed_at")?);

    let value = match kind {
        ObservationKind::CurrentTemperature => ReadingValue::Current(CurrentConditions {
            temperature_c: row.try_get("temperature")?,
            utc_offset_seconds: row.try_get("utc_offset_seconds")?,
        }),
        ObservationKind::HistoricalSeries(_) => {
            let encoded: String = row.try_get("samples")?;
            let samples: Vec<HourlySample> = serde_json::from_str(&encoded)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
            ReadingValue::Series(samples)
        }
    };

    Ok(Reading {
        location,
        kind: *kind,
        value,
        observed_at,
    })
}

/// Cutoffs beyond the representable nanosecond range clamp to the nearest end.
fn nanos_floor(t: DateTime<Utc>) -> i64 {
    t.timestamp_nanos_opt()
        .unwrap_or(if t.timestamp() < 0 { i64::MIN } else { i64::MAX })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DateRange;
    use chrono::{Duration, NaiveDate};

    fn london() -> Location {
        Location::new(51.5, -0.12).unwrap()
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn current(temperature_c: f64) -> ReadingValue {
        ReadingValue::Current(CurrentConditions { temperature_c, utc_offset_seconds: 3600 })
    }

    fn january() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
        )
        .unwrap()
    }

    fn series(range: &DateRange) -> Vec<HourlySample> {
        (0..range.expected_hours() as i64)
            .map(|h| HourlySample {
                time: range.start_instant() + Duration::hours(h),
                temperature_c: Some(3.0 + h as f64 * 0.1),
            })
            .collect()
    }

    #[tokio::test]
    async fn put_then_get_returns_the_written_reading() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let kind = ObservationKind::CurrentTemperature;
        let observed_at = noon() + Duration::nanoseconds(123_456_789);

        let written = store.put(london(), &kind, &current(14.2), observed_at).await.unwrap();
        let read = store
            .get_fresh(london(), &kind, Freshness::Within(Duration::hours(1)), observed_at)
            .await
            .unwrap();

        assert_eq!(read, Some(written));
    }

    #[tokio::test]
    async fn get_fresh_ignores_readings_outside_the_window() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let kind = ObservationKind::CurrentTemperature;

        store.put(london(), &kind, &current(9.0), noon()).await.unwrap();

        let later = noon() + Duration::minutes(90);
        let read = store
            .get_fresh(london(), &kind, Freshness::Within(Duration::hours(1)), later)
            .await
            .unwrap();

        assert_eq!(read, None);
        assert_eq!(store.count(london(), &kind).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn get_fresh_on_empty_store_is_not_found() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let read = store
            .get_fresh(london(), &ObservationKind::CurrentTemperature, Freshness::Forever, noon())
            .await
            .unwrap();
        assert_eq!(read, None);
    }

    #[tokio::test]
    async fn newest_reading_wins() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let kind = ObservationKind::CurrentTemperature;

        store.put(london(), &kind, &current(10.0), noon()).await.unwrap();
        store
            .put(london(), &kind, &current(11.5), noon() + Duration::minutes(20))
            .await
            .unwrap();

        let read = store
            .get_fresh(london(), &kind, Freshness::Forever, noon() + Duration::minutes(30))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(read.value, current(11.5));
        assert_eq!(read.observed_at, noon() + Duration::minutes(20));
        assert_eq!(store.count(london(), &kind).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn series_temperatures_keep_every_bit() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let day = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let range = DateRange::new(day, day).unwrap();
        let kind = ObservationKind::HistoricalSeries(range);

        let awkward = [0.1 + 0.2, 7.6000000000000005, -17.299999999999997, 1e-300];
        let samples: Vec<HourlySample> = series(&range)
            .into_iter()
            .zip(awkward.iter().copied().cycle())
            .map(|(sample, t)| HourlySample {
                temperature_c: Some(t),
                ..sample
            })
            .collect();

        store
            .put(london(), &kind, &ReadingValue::Series(samples.clone()), noon())
            .await
            .unwrap();
        let read = store
            .get_fresh(london(), &kind, Freshness::Forever, noon())
            .await
            .unwrap()
            .unwrap();

        let ReadingValue::Series(read_back) = read.value else {
            panic!("expected a series");
        };
        for (got, want) in read_back.iter().zip(&samples) {
            let (got, want) = (got.temperature_c.unwrap(), want.temperature_c.unwrap());
            assert_eq!(got.to_bits(), want.to_bits());
        }
    }

    #[tokio::test]
    async fn locations_are_matched_exactly() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let kind = ObservationKind::CurrentTemperature;

        store.put(london(), &kind, &current(10.0), noon()).await.unwrap();

        let nearby = Location::new(51.5001, -0.12).unwrap();
        let read = store.get_fresh(nearby, &kind, Freshness::Forever, noon()).await.unwrap();
        assert_eq!(read, None);
    }

    #[tokio::test]
    async fn historical_series_are_keyed_by_whole_range() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let range = january();
        let kind = ObservationKind::HistoricalSeries(range);
        let samples = series(&range);

        store
            .put(london(), &kind, &ReadingValue::Series(samples.clone()), noon())
            .await
            .unwrap();

        let years_later = noon() + Duration::days(2000);
        let read = store
            .get_fresh(london(), &kind, Freshness::Forever, years_later)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.value, ReadingValue::Series(samples));

        let first_day = DateRange::new(range.start, range.start).unwrap();
        let other = store
            .get_fresh(
                london(),
                &ObservationKind::HistoricalSeries(first_day),
                Freshness::Forever,
                years_later,
            )
            .await
            .unwrap();
        assert_eq!(other, None);
    }

    #[tokio::test]
    async fn current_and_historical_tables_do_not_mix() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let range = january();

        store
            .put(london(), &ObservationKind::CurrentTemperature, &current(10.0), noon())
            .await
            .unwrap();

        let read = store
            .get_fresh(london(), &ObservationKind::HistoricalSeries(range), Freshness::Forever, noon())
            .await
            .unwrap();
        assert_eq!(read, None);
    }

    #[tokio::test]
    async fn mismatched_value_is_rejected() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let err = store
            .put(
                london(),
                &ObservationKind::CurrentTemperature,
                &ReadingValue::Series(Vec::new()),
                noon(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidReading(_)));
    }

    #[tokio::test]
    async fn non_finite_temperature_is_rejected() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let err = store
            .put(london(), &ObservationKind::CurrentTemperature, &current(f64::NAN), noon())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidReading(_)));
    }

    #[tokio::test]
    async fn closed_store_reports_unavailable_instead_of_missing() {
        let store = CacheStore::open_in_memory().await.unwrap();
        store.pool.close().await;

        let err = store
            .get_fresh(london(), &ObservationKind::CurrentTemperature, Freshness::Forever, noon())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn readings_survive_reopening_the_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("weather_cache.sqlite");
        let kind = ObservationKind::CurrentTemperature;

        let store = CacheStore::open(&path).await.unwrap();
        store.put(london(), &kind, &current(12.0), noon()).await.unwrap();
        store.close().await;

        let reopened = CacheStore::open(&path).await.unwrap();
        let read = reopened
            .get_fresh(london(), &kind, Freshness::Within(Duration::hours(1)), noon())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.value, current(12.0));
        reopened.close().await;
    }
}
