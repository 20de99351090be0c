use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::Error;

/// A coordinate pair used as a cache key. Equality is exact: no proximity matching.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, Error> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidLocation(format!(
                "latitude {latitude} must be between -90 and 90"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidLocation(format!(
                "longitude {longitude} must be between -180 and 180"
            )));
        }
        Ok(Self { latitude, longitude })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

/// Parses the `"<lat>, <lon>"` form used for selectable search results.
impl FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| Error::InvalidLocation(format!("expected \"lat, lon\", got {s:?}")))?;

        let parse = |part: &str| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| Error::InvalidLocation(format!("{:?} is not a number", part.trim())))
        };

        Location::new(parse(lat)?, parse(lon)?)
    }
}

/// Inclusive range of calendar days, interpreted in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, Error> {
        if end < start {
            return Err(Error::InvalidDateRange(format!(
                "end date {end} is before start date {start}"
            )));
        }
        if end.checked_add_days(Days::new(1)).is_none() {
            return Err(Error::InvalidDateRange(format!("end date {end} is out of range")));
        }
        Ok(Self { start, end })
    }

    /// Midnight UTC at the start of the first day.
    pub fn start_instant(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// Midnight UTC after the last day (exclusive bound).
    pub fn end_instant(&self) -> DateTime<Utc> {
        self.end
            .checked_add_days(Days::new(1))
            .unwrap_or(NaiveDate::MAX)
            .and_time(NaiveTime::MIN)
            .and_utc()
    }

    /// Number of hourly samples that cover the range.
    pub fn expected_hours(&self) -> usize {
        (self.end_instant() - self.start_instant()).num_hours() as usize
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationKind {
    CurrentTemperature,
    /// Keyed by the whole requested range; overlapping ranges are cached independently.
    HistoricalSeries(DateRange),
}

impl fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationKind::CurrentTemperature => f.write_str("current temperature"),
            ObservationKind::HistoricalSeries(range) => write!(f, "historical series {range}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature_c: f64,
    pub utc_offset_seconds: i32,
}

impl CurrentConditions {
    /// Wall-clock time at the location. An offset chrono cannot represent falls back to UTC.
    pub fn local_time(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        let offset = FixedOffset::east_opt(self.utc_offset_seconds).unwrap_or_else(|| Utc.fix());
        now.with_timezone(&offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlySample {
    pub time: DateTime<Utc>,
    /// `None` where the archive has no value for that hour.
    pub temperature_c: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadingValue {
    Current(CurrentConditions),
    Series(Vec<HourlySample>),
}

/// One immutable cached observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub location: Location,
    pub kind: ObservationKind,
    pub value: ReadingValue,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeCandidate {
    pub display_name: String,
    pub location: Location,
}
