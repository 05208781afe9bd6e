//! Output record and run summary types.

use crate::models::Gender;
use chrono::NaiveDate;
use serde::Serialize;

/// Marker written wherever a value is not available.
pub const NOT_AVAILABLE: &str = "N/A";

/// Serialize `None` as [`NOT_AVAILABLE`] instead of null/empty.
///
/// Keeps "no data" distinguishable from zero in both JSON and CSV output.
pub mod not_available {
    use super::NOT_AVAILABLE;
    use serde::{Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(v) => v.serialize(serializer),
            None => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

/// One row of the player report.
///
/// Flat and fully owned; built once per player by the record assembler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    pub club_id: String,
    pub club_name: String,
    pub player_id: String,
    pub name: String,

    #[serde(serialize_with = "not_available::serialize")]
    pub gender: Option<Gender>,
    #[serde(serialize_with = "not_available::serialize")]
    pub birth_year: Option<i32>,
    #[serde(serialize_with = "not_available::serialize")]
    pub age: Option<i32>,
    #[serde(serialize_with = "not_available::serialize")]
    pub rating: Option<i32>,

    /// Competition rank by rating, descending
    #[serde(serialize_with = "not_available::serialize")]
    pub rank: Option<u32>,
    /// Percentile within the (gender, age) group
    #[serde(serialize_with = "not_available::serialize")]
    pub percentile: Option<f64>,
    #[serde(serialize_with = "not_available::serialize")]
    pub group_size: Option<usize>,

    // History-derived fields
    #[serde(serialize_with = "not_available::serialize")]
    pub rating_at_cutoff: Option<i32>,
    #[serde(serialize_with = "not_available::serialize")]
    pub cutoff_period: Option<NaiveDate>,
    #[serde(serialize_with = "not_available::serialize")]
    pub peak_rating: Option<i32>,
    #[serde(serialize_with = "not_available::serialize")]
    pub lowest_rating: Option<i32>,
    #[serde(serialize_with = "not_available::serialize")]
    pub first_period: Option<NaiveDate>,
    #[serde(serialize_with = "not_available::serialize")]
    pub last_period: Option<NaiveDate>,
    #[serde(serialize_with = "not_available::serialize")]
    pub rating_change: Option<i32>,
    #[serde(serialize_with = "not_available::serialize")]
    pub games_played: Option<u32>,
    #[serde(serialize_with = "not_available::serialize")]
    pub points: Option<f64>,
    /// Points per game in percent with a decimal comma, e.g. "53,4"
    #[serde(serialize_with = "not_available::serialize")]
    pub success_rate: Option<String>,
}

/// Group excluded from percentile computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedGroup {
    pub gender: Gender,
    pub age: i32,
    pub sample_size: usize,
}

/// End-of-run summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Clubs returned by the source
    pub total_clubs: usize,

    /// Clubs already completed by a previous run
    pub skipped_clubs: usize,

    /// Clubs whose player list could not be fetched
    pub failed_clubs: usize,

    /// Players with a final result (this run or resumed)
    pub processed_players: usize,

    /// Players whose history fetch failed
    pub failed_players: usize,

    /// Groups that received a percentile table
    pub groups: usize,

    /// Groups dropped for insufficient sample size
    pub excluded_groups: Vec<ExcludedGroup>,

    /// Whether the run stopped early on request
    pub cancelled: bool,

    /// Total runtime in seconds
    pub runtime_secs: f64,

    /// Players processed per hour
    pub throughput_per_hour: f64,
}

impl RunSummary {
    /// Calculate derived stats.
    pub fn finalize(&mut self) {
        if self.runtime_secs > 0.0 {
            self.throughput_per_hour = self.processed_players as f64 / self.runtime_secs * 3600.0;
        }
    }

    /// Every attempted player failed; nothing usable was produced.
    pub fn nothing_succeeded(&self) -> bool {
        self.processed_players == 0 && (self.failed_players > 0 || self.failed_clubs > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_nothing_succeeded() {
        let mut summary = RunSummary {
            failed_players: 3,
            ..Default::default()
        };
        assert!(summary.nothing_succeeded());
        summary.processed_players = 1;
        assert!(!summary.nothing_succeeded());
        assert!(!RunSummary::default().nothing_succeeded());
    }

    #[test]
    fn test_summary_throughput() {
        let mut summary = RunSummary {
            processed_players: 100,
            runtime_secs: 360.0,
            ..Default::default()
        };
        summary.finalize();
        assert!((summary.throughput_per_hour - 1000.0).abs() < 1e-9);
    }
}
