//! Record assembly.
//!
//! Turns (player, analysis, percentile) into the flat [`OutputRecord`].
//! Everything here is pure; nothing touches the checkpoint or the network.

use crate::models::{OutputRecord, PlayerResult};
use crate::stats::{GroupStatistics, competition_ranks};
use std::cmp::Ordering;

/// Success rate as `points / games * 100` with one decimal and a decimal
/// comma. `"0,0"` when no games were played.
pub fn success_rate(points: f64, games: u32) -> String {
    if games == 0 {
        return "0,0".to_string();
    }
    let rate = points / f64::from(games) * 100.0;
    format!("{rate:.1}").replace('.', ",")
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Build one record.
///
/// `percentile` is `(percentile, group size)` when the player's group
/// qualified. A missing analysis leaves every history field absent.
pub fn assemble(
    result: &PlayerResult,
    percentile: Option<(f64, usize)>,
    rank: Option<u32>,
    reference_year: i32,
) -> OutputRecord {
    let player = &result.player;
    let analysis = result.analysis.as_ref();

    OutputRecord {
        club_id: result.context.club_id.clone(),
        club_name: result.context.club_name.clone(),
        player_id: player.id.clone(),
        name: player.name.clone(),
        gender: player.gender,
        birth_year: player.birth_year,
        age: player.age(reference_year),
        rating: player.rating,
        rank,
        percentile: percentile.map(|(p, _)| round_one_decimal(p)),
        group_size: percentile.map(|(_, n)| n),
        rating_at_cutoff: analysis.and_then(|a| a.rating_at_cutoff),
        cutoff_period: analysis.and_then(|a| a.cutoff_period),
        peak_rating: analysis.map(|a| a.peak_rating),
        lowest_rating: analysis.map(|a| a.lowest_rating),
        first_period: analysis.map(|a| a.first_period),
        last_period: analysis.map(|a| a.last_period),
        rating_change: analysis.map(|a| a.rating_change),
        games_played: analysis.map(|a| a.games_played),
        points: analysis.map(|a| a.points),
        success_rate: analysis.map(|a| success_rate(a.points, a.games_played)),
    }
}

/// Rank the whole population by current rating and assemble every record.
///
/// Output is sorted by (rank, player id); unrated players come last.
pub fn assemble_all(results: &[PlayerResult], stats: &GroupStatistics) -> Vec<OutputRecord> {
    let ratings: Vec<Option<i64>> = results
        .iter()
        .map(|r| r.player.rating.map(i64::from))
        .collect();
    let ranks = competition_ranks(&ratings);

    let mut records: Vec<OutputRecord> = results
        .iter()
        .zip(ranks)
        .map(|(result, rank)| {
            assemble(
                result,
                stats.percentile_for(&result.player),
                rank,
                stats.reference_year,
            )
        })
        .collect();

    records.sort_by(compare_records);
    records
}

fn compare_records(a: &OutputRecord, b: &OutputRecord) -> Ordering {
    let rank_order = match (a.rank, b.rank) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    rank_order.then_with(|| a.player_id.cmp(&b.player_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClubContext, Gender, HistoricalAnalysis, Player};
    use chrono::NaiveDate;

    fn result(id: &str, rating: Option<i32>, analysis: Option<HistoricalAnalysis>) -> PlayerResult {
        PlayerResult {
            context: ClubContext {
                club_id: "c1".to_string(),
                club_name: "Club One".to_string(),
            },
            player: Player {
                id: id.to_string(),
                name: format!("Player {id}"),
                gender: Some(Gender::Male),
                birth_year: Some(1990),
                rating,
            },
            analysis,
        }
    }

    fn analysis(games: u32, points: f64) -> HistoricalAnalysis {
        let period = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        HistoricalAnalysis {
            rating_at_cutoff: Some(1700),
            cutoff_period: Some(period),
            peak_rating: 1750,
            lowest_rating: 1600,
            first_period: period,
            last_period: period,
            rating_change: 50,
            games_played: games,
            points,
        }
    }

    #[test]
    fn test_success_rate_format() {
        assert_eq!(success_rate(47.0, 88), "53,4");
        assert_eq!(success_rate(5.0, 10), "50,0");
        assert_eq!(success_rate(0.0, 0), "0,0");
    }

    #[test]
    fn test_assemble_with_analysis() {
        let record = assemble(
            &result("p1", Some(1720), Some(analysis(88, 47.0))),
            Some((73.456, 25)),
            Some(3),
            2024,
        );
        assert_eq!(record.age, Some(34));
        assert_eq!(record.percentile, Some(73.5));
        assert_eq!(record.group_size, Some(25));
        assert_eq!(record.rank, Some(3));
        assert_eq!(record.success_rate.as_deref(), Some("53,4"));
        assert_eq!(record.peak_rating, Some(1750));
    }

    #[test]
    fn test_missing_analysis_renders_na() {
        let record = assemble(&result("p1", Some(1500), None), None, Some(1), 2024);
        assert_eq!(record.success_rate, None);
        assert_eq!(record.peak_rating, None);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["success_rate"], "N/A");
        assert_eq!(json["percentile"], "N/A");
        assert_eq!(json["rating_at_cutoff"], "N/A");
        assert_eq!(json["rating"], 1500);
    }

    #[test]
    fn test_assemble_all_orders_by_rank_then_id() {
        let results = vec![
            result("b", Some(1600), None),
            result("z", None, None),
            result("c", Some(1800), None),
            result("a", Some(1600), None),
        ];
        let records = assemble_all(&results, &GroupStatistics::default());

        let order: Vec<(&str, Option<u32>)> = records
            .iter()
            .map(|r| (r.player_id.as_str(), r.rank))
            .collect();
        assert_eq!(
            order,
            vec![("c", Some(1)), ("a", Some(2)), ("b", Some(2)), ("z", None)]
        );
    }
}
