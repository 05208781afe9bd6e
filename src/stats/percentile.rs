//! Percentile statistics over (gender, age) groups.
//!
//! Everything here is pure and runs once, after every club has been
//! processed, so results never depend on worker scheduling.
//!
//! Table construction for p in 0..=100 over sorted values v[0..n]:
//! - p = 0 → v[0], p = 100 → v[n-1]
//! - else rank = p·(n−1)/100, linear interpolation between v[floor(rank)]
//!   and v[floor(rank)+1], truncated to an integer

use crate::models::{ExcludedGroup, Gender, Player};
use serde::Serialize;
use std::collections::BTreeMap;

/// Number of entries in a table (0..=100).
pub const PERCENTILE_STEPS: usize = 101;

/// Grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupKey {
    pub gender: Gender,
    pub age: i32,
}

impl GroupKey {
    /// Key of a player, if gender and birth year are known and the age is
    /// not negative.
    pub fn of(player: &Player, reference_year: i32) -> Option<Self> {
        let gender = player.gender?;
        let age = player.age(reference_year)?;
        (age >= 0).then_some(Self { gender, age })
    }
}

/// Thresholds per percentile, non-decreasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PercentileTable {
    thresholds: Vec<i64>,
}

impl PercentileTable {
    /// Build a table from ascending values. `None` for an empty slice.
    pub fn build(sorted: &[i64]) -> Option<Self> {
        let n = sorted.len();
        let (first, last) = (*sorted.first()?, *sorted.last()?);

        let thresholds = (0..PERCENTILE_STEPS)
            .map(|p| match p {
                0 => first,
                100 => last,
                _ => {
                    let rank = p as f64 * (n - 1) as f64 / 100.0;
                    let lower = rank.floor() as usize;
                    let upper = lower + 1;
                    if upper >= n {
                        last
                    } else {
                        let frac = rank - lower as f64;
                        let value = sorted[lower] as f64 * (1.0 - frac) + sorted[upper] as f64 * frac;
                        value as i64
                    }
                }
            })
            .collect();

        Some(Self { thresholds })
    }

    /// Threshold at percentile `p` (clamped to 100).
    pub fn threshold(&self, p: usize) -> i64 {
        self.thresholds[p.min(PERCENTILE_STEPS - 1)]
    }

    pub fn thresholds(&self) -> &[i64] {
        &self.thresholds
    }

    /// Percentile rank of `value`.
    ///
    /// The lowest percentile whose threshold is ≥ `value`, interpolated
    /// linearly when `value` falls strictly between two thresholds.
    /// Saturates at 0 and 100.
    pub fn percentile_of(&self, value: i64) -> f64 {
        let t = &self.thresholds;
        if value <= t[0] {
            return 0.0;
        }
        if value > t[PERCENTILE_STEPS - 1] {
            return 100.0;
        }

        // t is sorted; first index with t[p] >= value, p >= 1 here
        let p = t.partition_point(|&x| x < value);
        if t[p] == value {
            return p as f64;
        }

        let (lo, hi) = (t[p - 1], t[p]);
        (p - 1) as f64 + (value - lo) as f64 / (hi - lo) as f64
    }

    pub fn is_monotonic(&self) -> bool {
        self.thresholds.windows(2).all(|w| w[0] <= w[1])
    }
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

/// Median of ascending values; 0 for an empty slice.
pub fn median(sorted: &[i64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2] as f64,
        _ => (sorted[n / 2 - 1] as f64 + sorted[n / 2] as f64) / 2.0,
    }
}

/// Players sharing a (gender, age) key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeGenderGroup {
    pub key: GroupKey,
    /// Member player ids
    pub members: Vec<String>,
    pub sample_size: usize,
    pub mean: f64,
    pub median: f64,
    /// Member ratings, ascending
    #[serde(skip)]
    pub values: Vec<i64>,
}

/// Group players by (gender, age).
///
/// Players without gender, birth year or rating are left out entirely.
pub fn group_players<'a>(
    players: impl IntoIterator<Item = &'a Player>,
    reference_year: i32,
) -> BTreeMap<GroupKey, AgeGenderGroup> {
    let mut buckets: BTreeMap<GroupKey, Vec<(i64, &Player)>> = BTreeMap::new();
    for player in players {
        let (Some(key), Some(rating)) = (GroupKey::of(player, reference_year), player.rating)
        else {
            continue;
        };
        buckets
            .entry(key)
            .or_default()
            .push((i64::from(rating), player));
    }

    buckets
        .into_iter()
        .map(|(key, mut entries)| {
            entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
            let values: Vec<i64> = entries.iter().map(|(v, _)| *v).collect();
            let group = AgeGenderGroup {
                key,
                members: entries.iter().map(|(_, p)| p.id.clone()).collect(),
                sample_size: values.len(),
                mean: mean(&values),
                median: median(&values),
                values,
            };
            (key, group)
        })
        .collect()
}

/// A qualifying group with its table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupReport {
    #[serde(flatten)]
    pub group: AgeGenderGroup,
    pub table: PercentileTable,
}

/// Statistics over the full population.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupStatistics {
    pub reference_year: i32,
    pub min_sample_size: usize,
    #[serde(serialize_with = "serialize_reports")]
    pub groups: BTreeMap<GroupKey, GroupReport>,
    pub excluded: Vec<ExcludedGroup>,
}

/// JSON maps need string keys; reports carry their key, so emit a list.
fn serialize_reports<S: serde::Serializer>(
    groups: &BTreeMap<GroupKey, GroupReport>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(groups.values())
}

impl GroupStatistics {
    /// Group the population and build tables for groups meeting
    /// `min_sample_size`.
    pub fn compute<'a>(
        players: impl IntoIterator<Item = &'a Player>,
        reference_year: i32,
        min_sample_size: usize,
    ) -> Self {
        let mut stats = Self {
            reference_year,
            min_sample_size,
            ..Default::default()
        };

        for (key, group) in group_players(players, reference_year) {
            if group.sample_size < min_sample_size {
                stats.excluded.push(ExcludedGroup {
                    gender: key.gender,
                    age: key.age,
                    sample_size: group.sample_size,
                });
                continue;
            }
            if let Some(table) = PercentileTable::build(&group.values) {
                stats.groups.insert(key, GroupReport { group, table });
            }
        }
        stats
    }

    pub fn table(&self, key: &GroupKey) -> Option<&PercentileTable> {
        self.groups.get(key).map(|g| &g.table)
    }

    /// Percentile and group size of a player, when its group qualified.
    pub fn percentile_for(&self, player: &Player) -> Option<(f64, usize)> {
        let key = GroupKey::of(player, self.reference_year)?;
        let rating = player.rating?;
        let report = self.groups.get(&key)?;
        Some((
            report.table.percentile_of(i64::from(rating)),
            report.group.sample_size,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: &str, gender: Gender, birth_year: i32, rating: i32) -> Player {
        Player {
            id: id.to_string(),
            name: id.to_string(),
            gender: Some(gender),
            birth_year: Some(birth_year),
            rating: Some(rating),
        }
    }

    fn decile_values() -> Vec<i64> {
        (0..10).map(|i| 1000 + 100 * i).collect()
    }

    #[test]
    fn test_round_trip_over_deciles() {
        let values = decile_values();
        let table = PercentileTable::build(&values).unwrap();

        assert_eq!(table.threshold(0), 1000);
        assert_eq!(table.threshold(100), 1900);
        assert_eq!(table.percentile_of(1000), 0.0);
        assert_eq!(table.percentile_of(1900), 100.0);
        assert_eq!(median(&values), table.threshold(50) as f64);
        assert_eq!(mean(&values), 1450.0);
    }

    #[test]
    fn test_interpolation_truncates() {
        // rank for p=1 over 3 values is 0.02 → 1000 + 0.02*333 = 1006.66 → 1006
        let table = PercentileTable::build(&[1000, 1333, 2000]).unwrap();
        assert_eq!(table.threshold(1), 1006);
        assert!(table.is_monotonic());
    }

    #[test]
    fn test_monotonic_with_duplicates_and_outliers() {
        let mut values = vec![1200, 1200, 1200, 1250, 1900, 2700, 800, 1200, 1500];
        values.sort_unstable();
        let table = PercentileTable::build(&values).unwrap();
        assert!(table.is_monotonic());
        assert_eq!(table.thresholds().len(), PERCENTILE_STEPS);
    }

    #[test]
    fn test_single_value_table() {
        let table = PercentileTable::build(&[1500]).unwrap();
        assert!(table.thresholds().iter().all(|&t| t == 1500));
        assert_eq!(table.percentile_of(1500), 0.0);
        assert_eq!(table.percentile_of(1600), 100.0);
        assert!(PercentileTable::build(&[]).is_none());
    }

    #[test]
    fn test_lookup_interpolates_and_saturates() {
        let table = PercentileTable::build(&decile_values()).unwrap();
        // t[50] = 1450 and t[51] sits just below 1460
        let p = table.percentile_of(1455);
        assert!(p > 50.0 && p < 51.0, "got {p}");
        assert_eq!(table.percentile_of(5000), 100.0);
        assert_eq!(table.percentile_of(10), 0.0);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[1, 3, 5]), 3.0);
        assert_eq!(median(&[1, 3, 5, 8]), 4.0);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn test_sample_size_gate() {
        let min = 5;
        let mut players: Vec<Player> = (0..min)
            .map(|i| player(&format!("m{i}"), Gender::Male, 2000, 1500 + i as i32))
            .collect();
        players.extend(
            (0..min - 1).map(|i| player(&format!("f{i}"), Gender::Female, 2000, 1400 + i as i32)),
        );

        let stats = GroupStatistics::compute(&players, 2024, min);

        let male = GroupKey {
            gender: Gender::Male,
            age: 24,
        };
        let female = GroupKey {
            gender: Gender::Female,
            age: 24,
        };
        assert!(stats.table(&male).is_some());
        assert!(stats.table(&female).is_none());
        assert_eq!(
            stats.excluded,
            vec![ExcludedGroup {
                gender: Gender::Female,
                age: 24,
                sample_size: min - 1
            }]
        );
        assert!(stats.percentile_for(&players[min]).is_none());
        assert_eq!(stats.percentile_for(&players[0]), Some((0.0, min)));
    }

    #[test]
    fn test_incomplete_players_are_not_grouped() {
        let mut no_gender = player("a", Gender::Male, 1990, 1500);
        no_gender.gender = None;
        let mut no_birth = player("b", Gender::Male, 1990, 1500);
        no_birth.birth_year = None;
        let mut no_rating = player("c", Gender::Male, 1990, 1500);
        no_rating.rating = None;
        let complete = player("d", Gender::Male, 1990, 1500);

        let groups = group_players([&no_gender, &no_birth, &no_rating, &complete], 2024);
        assert_eq!(groups.len(), 1);
        let group = groups.values().next().unwrap();
        assert_eq!(group.members, vec!["d".to_string()]);
        assert_eq!(group.key.age, 34);
    }

    #[test]
    fn test_grouping_is_order_independent() {
        let players: Vec<Player> = (0..40)
            .map(|i| {
                let gender = if i % 2 == 0 { Gender::Male } else { Gender::Female };
                player(&format!("p{i}"), gender, 1990 + (i % 3), 1200 + (i * 37) % 900)
            })
            .collect();
        let mut reversed = players.clone();
        reversed.reverse();

        let a = GroupStatistics::compute(&players, 2024, 3);
        let b = GroupStatistics::compute(&reversed, 2024, 3);
        assert_eq!(a, b);
        assert!(a.groups.values().all(|g| g.table.is_monotonic()));
    }
}
