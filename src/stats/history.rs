//! Rating-history analysis.

use crate::models::{HistoricalAnalysis, RatingPoint};
use chrono::NaiveDate;

/// Derive a [`HistoricalAnalysis`] from a player's rating history.
///
/// Returns `None` for an empty history. The rating at cutoff comes from the
/// latest period strictly before `cutoff`; periods on or after the cutoff
/// never count.
pub fn analyze(history: &[RatingPoint], cutoff: NaiveDate) -> Option<HistoricalAnalysis> {
    let mut points: Vec<&RatingPoint> = history.iter().collect();
    points.sort_by_key(|p| p.period);

    let first = *points.first()?;
    let last = *points.last()?;

    let at_cutoff = points.iter().rev().find(|p| p.period < cutoff);

    Some(HistoricalAnalysis {
        rating_at_cutoff: at_cutoff.map(|p| p.rating),
        cutoff_period: at_cutoff.map(|p| p.period),
        peak_rating: points.iter().map(|p| p.rating).max().unwrap_or(first.rating),
        lowest_rating: points.iter().map(|p| p.rating).min().unwrap_or(first.rating),
        first_period: first.period,
        last_period: last.period,
        rating_change: last.rating - first.rating,
        games_played: points.iter().map(|p| p.games).sum(),
        points: points.iter().map(|p| p.points).sum(),
    })
}
