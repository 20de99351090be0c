//! How long a cached reading stays usable, per observation kind.

use chrono::{DateTime, Duration, Utc};

use crate::model::ObservationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Within(Duration),
    Forever,
}

impl Freshness {
    /// Oldest `observed_at` still admitted at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Freshness::Within(window) => {
                Some(now.checked_sub_signed(*window).unwrap_or(DateTime::<Utc>::MIN_UTC))
            }
            Freshness::Forever => None,
        }
    }

    pub fn admits(&self, observed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.cutoff(now).is_none_or(|cutoff| observed_at >= cutoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub current: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self { current: Duration::hours(1) }
    }
}

impl FreshnessPolicy {
    pub fn window(&self, kind: &ObservationKind) -> Freshness {
        match kind {
            ObservationKind::CurrentTemperature => Freshness::Within(self.current),
            // Archived hours never change once published.
            ObservationKind::HistoricalSeries(_) => Freshness::Forever,
        }
    }
}
