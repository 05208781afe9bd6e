//! Report files.
//!
//! - `players.json`: array of records
//! - `players.csv`: same records, one row each
//! - `groups.json`: per-group statistics plus the excluded groups
//!
//! Every file goes through [`write_atomic`], so a crash never leaves a
//! truncated report behind.

use crate::checkpoint::write_atomic;
use crate::models::{OutputFormat, OutputRecord, Result, ScanError};
use crate::stats::GroupStatistics;
use std::path::{Path, PathBuf};
use tracing::info;

pub const PLAYERS_JSON: &str = "players.json";
pub const PLAYERS_CSV: &str = "players.csv";
pub const GROUPS_JSON: &str = "groups.json";

/// Write `players.json`.
pub fn write_players_json(dir: &Path, records: &[OutputRecord]) -> Result<PathBuf> {
    let path = dir.join(PLAYERS_JSON);
    let bytes = serde_json::to_vec_pretty(records)
        .map_err(|e| ScanError::Internal(format!("Failed to serialize records: {}", e)))?;
    write_atomic(&path, &bytes)?;
    Ok(path)
}

/// Write `players.csv` with a header row.
pub fn write_players_csv(dir: &Path, records: &[OutputRecord]) -> Result<PathBuf> {
    let path = dir.join(PLAYERS_CSV);
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer
            .serialize(record)
            .map_err(|e| ScanError::Internal(format!("Failed to write CSV row: {}", e)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ScanError::Internal(format!("Failed to finish CSV: {}", e)))?;
    write_atomic(&path, &bytes)?;
    Ok(path)
}

/// Write `groups.json`.
pub fn write_groups_json(dir: &Path, stats: &GroupStatistics) -> Result<PathBuf> {
    let path = dir.join(GROUPS_JSON);
    let bytes = serde_json::to_vec_pretty(stats)
        .map_err(|e| ScanError::Internal(format!("Failed to serialize groups: {}", e)))?;
    write_atomic(&path, &bytes)?;
    Ok(path)
}

/// Write every report the output format asks for.
///
/// Returns the paths written.
pub fn write_reports(
    dir: &Path,
    format: OutputFormat,
    records: &[OutputRecord],
    stats: &GroupStatistics,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    if format.writes_json() {
        written.push(write_players_json(dir, records)?);
    }
    if format.writes_csv() {
        written.push(write_players_csv(dir, records)?);
    }
    written.push(write_groups_json(dir, stats)?);

    info!(
        dir = %dir.display(),
        records = records.len(),
        files = written.len(),
        "Reports written"
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClubContext, Gender, Player, PlayerResult};
    use crate::report::assemble;
    use tempfile::TempDir;

    fn records() -> Vec<OutputRecord> {
        let result = PlayerResult {
            context: ClubContext {
                club_id: "c1".to_string(),
                club_name: "Club, One".to_string(),
            },
            player: Player {
                id: "p1".to_string(),
                name: "Anna".to_string(),
                gender: Some(Gender::Female),
                birth_year: Some(2000),
                rating: Some(1800),
            },
            analysis: None,
        };
        vec![assemble(&result, None, Some(1), 2024)]
    }

    #[test]
    fn test_write_both_formats() {
        let dir = TempDir::new().unwrap();
        let paths = write_reports(
            dir.path(),
            OutputFormat::Both,
            &records(),
            &GroupStatistics::default(),
        )
        .unwrap();
        assert_eq!(paths.len(), 3);

        let json = std::fs::read_to_string(dir.path().join(PLAYERS_JSON)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["player_id"], "p1");
        assert_eq!(parsed[0]["gender"], "F");
        assert_eq!(parsed[0]["percentile"], "N/A");

        let csv = std::fs::read_to_string(dir.path().join(PLAYERS_CSV)).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("club_id,club_name,player_id"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("c1,\"Club, One\",p1,Anna,F,2000,24,1800,1,N/A"));
    }

    #[test]
    fn test_json_only_skips_csv() {
        let dir = TempDir::new().unwrap();
        write_reports(
            dir.path(),
            OutputFormat::Json,
            &records(),
            &GroupStatistics::default(),
        )
        .unwrap();
        assert!(dir.path().join(PLAYERS_JSON).exists());
        assert!(dir.path().join(GROUPS_JSON).exists());
        assert!(!dir.path().join(PLAYERS_CSV).exists());
    }
}
