//! Domain entities read from the rating service.
//!
//! Clubs own players; players own a rating history.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A club (outer entity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Club {
    pub id: String,
    pub name: String,
}

/// Player gender as published by the rating service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M", alias = "m", alias = "male")]
    Male,
    #[serde(rename = "F", alias = "f", alias = "female")]
    Female,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Male => write!(f, "M"),
            Self::Female => write!(f, "F"),
        }
    }
}

/// A player (inner entity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub birth_year: Option<i32>,
    /// Current rating; the primary metric
    #[serde(default)]
    pub rating: Option<i32>,
}

impl Player {
    /// Age in `reference_year`, when the birth year is known.
    pub fn age(&self, reference_year: i32) -> Option<i32> {
        self.birth_year.map(|born| reference_year - born)
    }
}

/// One rating period in a player's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingPoint {
    pub period: NaiveDate,
    pub rating: i32,
    #[serde(default)]
    pub games: u32,
    /// Points scored in the period (1 per win, 0.5 per draw)
    #[serde(default)]
    pub points: f64,
}

/// Derived view over a player's rating history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalAnalysis {
    /// Rating of the latest period strictly before the cutoff
    pub rating_at_cutoff: Option<i32>,
    pub cutoff_period: Option<NaiveDate>,
    pub peak_rating: i32,
    pub lowest_rating: i32,
    pub first_period: NaiveDate,
    pub last_period: NaiveDate,
    /// Last rating minus first rating
    pub rating_change: i32,
    pub games_played: u32,
    pub points: f64,
}

/// Where a player was found: the owning club.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubContext {
    pub club_id: String,
    pub club_name: String,
}

impl From<&Club> for ClubContext {
    fn from(club: &Club) -> Self {
        Self {
            club_id: club.id.clone(),
            club_name: club.name.clone(),
        }
    }
}

/// Final per-player outcome of the processing phase.
///
/// `analysis` is `None` when the service has no history for the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResult {
    pub context: ClubContext,
    pub player: Player,
    #[serde(default)]
    pub analysis: Option<HistoricalAnalysis>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_wire_format() {
        let json = r#"{"id":"p1","name":"Anna","gender":"female","birthYear":1990,"rating":1850}"#;
        let player: Player = serde_json::from_str(json).unwrap();
        assert_eq!(player.gender, Some(Gender::Female));
        assert_eq!(player.age(2024), Some(34));

        let out = serde_json::to_string(&player).unwrap();
        assert!(out.contains(r#""gender":"F""#));
    }

    #[test]
    fn test_player_missing_optionals() {
        let player: Player = serde_json::from_str(r#"{"id":"p2","name":"Bo"}"#).unwrap();
        assert_eq!(player.gender, None);
        assert_eq!(player.age(2024), None);
        assert_eq!(player.rating, None);
    }
}
