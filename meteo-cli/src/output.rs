//! Human-friendly rendering of dashboard widgets.

use chrono::{DateTime, Utc};
use meteo_core::{CurrentConditions, DateRange, GeocodeCandidate, HourlySample};
use std::fmt::{self, Write};

/// Shown wherever a value could not be fetched.
pub const NOT_AVAILABLE: &str = "N/A";

/// Wrapper so search results read well in a selection prompt.
#[derive(Debug, Clone)]
pub struct Choice(pub GeocodeCandidate);

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0.display_name, self.0.location)
    }
}

/// Whole degrees, halves rounded to even.
pub fn format_temperature(celsius: f64) -> String {
    format!("{}ºC", celsius.round_ties_even() as i64)
}

pub fn render_candidates(query: &str, candidates: &[GeocodeCandidate]) -> String {
    if candidates.is_empty() {
        return format!("No results for '{query}'.\n");
    }

    let mut out = String::new();
    for (i, candidate) in candidates.iter().enumerate() {
        let _ = writeln!(out, "{:>2}. {}", i + 1, Choice(candidate.clone()));
    }
    out
}

/// Temperature and local-time widgets; `None` renders both as N/A.
pub fn render_current(
    place: &GeocodeCandidate,
    current: Option<&CurrentConditions>,
    now: DateTime<Utc>,
) -> String {
    let temperature = current
        .map(|c| format_temperature(c.temperature_c))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    let local_time = current
        .map(|c| c.local_time(now).format("%H:%M").to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    format!(
        "{}\n  Current Temperature  {temperature}\n  Local Time           {local_time}\n",
        Choice(place.clone())
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSummary {
    pub samples: usize,
    pub missing: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

impl SeriesSummary {
    pub fn of(samples: &[HourlySample]) -> Self {
        let values: Vec<f64> = samples.iter().filter_map(|s| s.temperature_c).collect();

        let min = values.iter().copied().reduce(f64::min);
        let max = values.iter().copied().reduce(f64::max);
        let mean = (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64);

        Self {
            samples: samples.len(),
            missing: samples.len() - values.len(),
            min,
            max,
            mean,
        }
    }
}

fn one_decimal(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.1}ºC"))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

pub fn render_history(
    place: &GeocodeCandidate,
    range: &DateRange,
    samples: &[HourlySample],
    hourly: bool,
) -> String {
    let summary = SeriesSummary::of(samples);
    let mut out = String::new();

    let _ = writeln!(out, "{} | {} to {}", Choice(place.clone()), range.start, range.end);
    let _ = write!(out, "  {} hourly samples", summary.samples);
    if summary.missing > 0 {
        let _ = write!(out, " ({} missing)", summary.missing);
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "  min {}  max {}  mean {}",
        one_decimal(summary.min),
        one_decimal(summary.max),
        one_decimal(summary.mean)
    );

    if hourly {
        for sample in samples {
            let _ = writeln!(
                out,
                "  {}  {}",
                sample.time.format("%Y-%m-%d %H:%M"),
                one_decimal(sample.temperature_c)
            );
        }
    }

    out
}
