//! Checkpoint state for resumable runs.
//!
//! Epistemic foundation:
//! - K_i: A `completed` ledger entry is final; its result is stored alongside
//! - B_i: A checkpoint on disk belongs to this run → checked on resume
//! - I^B: The process may die between any two saves → resume from the ledger
//!
//! - The ledger records the final status of every club and player touched
//! - The partial cache memoizes fetched history and derived analysis for
//!   players that have not completed yet
//! - Completed player results are kept so a resumed run reassembles the
//!   full population without refetching

use crate::models::{
    ClubContext, Config, HistoricalAnalysis, OutputFormat, Player, PlayerResult, RatingPoint,
    Result, ScanError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Current checkpoint file format version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Kind of entity a ledger entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Club,
    Player,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Club => write!(f, "club"),
            Self::Player => write!(f, "player"),
        }
    }
}

/// Final status of a processed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Completed,
    Failed,
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub status: ProcessStatus,
    pub updated_at: DateTime<Utc>,
}

/// Ledger key: one entry per (type, id).
pub type LedgerKey = (EntityType, String);

/// Run parameters recorded in the checkpoint.
///
/// Used on resume to refuse continuing a differently scoped run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub filter_prefix: String,
    pub output_format: OutputFormat,
    pub concurrency: usize,
}

impl From<&Config> for RunSnapshot {
    fn from(config: &Config) -> Self {
        Self {
            filter_prefix: config.run.filter_prefix.clone(),
            output_format: config.output.format,
            concurrency: config.run.concurrency,
        }
    }
}

/// Progress counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub total_entities: usize,
    pub processed_entities: usize,
    pub current_phase: String,
}

/// Intermediate per-player work, persisted as soon as any field changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialResult {
    pub context: ClubContext,
    pub player: Player,
    #[serde(default)]
    pub history: Option<Vec<RatingPoint>>,
    #[serde(default)]
    pub analysis: Option<HistoricalAnalysis>,
}

impl PartialResult {
    pub fn new(context: ClubContext, player: Player) -> Self {
        Self {
            context,
            player,
            history: None,
            analysis: None,
        }
    }
}

/// Ledger counts per entity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub clubs_completed: usize,
    pub clubs_failed: usize,
    pub players_completed: usize,
    pub players_failed: usize,
    pub partial_entries: usize,
}

/// Recoverable state of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub version: u32,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Last save time
    pub timestamp: DateTime<Utc>,
    pub config: RunSnapshot,
    pub progress: Progress,
    #[serde(with = "ledger_format", default)]
    pub processed_ledger: HashMap<LedgerKey, LedgerEntry>,
    #[serde(default)]
    pub partial_cache: HashMap<String, PartialResult>,
    #[serde(default)]
    pub results: HashMap<String, PlayerResult>,
}

impl Checkpoint {
    /// Create a fresh checkpoint for a new run.
    pub fn new(config: RunSnapshot) -> Self {
        let now = Utc::now();
        Self {
            version: CHECKPOINT_VERSION,
            run_id: Uuid::new_v4(),
            started_at: now,
            timestamp: now,
            config,
            progress: Progress {
                current_phase: "discovery".to_string(),
                ..Default::default()
            },
            processed_ledger: HashMap::new(),
            partial_cache: HashMap::new(),
            results: HashMap::new(),
        }
    }

    /// Record the status of an entity, replacing any prior entry for the key.
    pub fn mark_processed(&mut self, entity_type: EntityType, id: &str, status: ProcessStatus) {
        self.processed_ledger.insert(
            (entity_type, id.to_string()),
            LedgerEntry {
                entity_type,
                entity_id: id.to_string(),
                status,
                updated_at: Utc::now(),
            },
        );
    }

    /// True iff the entity has a `completed` ledger entry.
    pub fn is_processed(&self, entity_type: EntityType, id: &str) -> bool {
        self.status(entity_type, id) == Some(ProcessStatus::Completed)
    }

    pub fn status(&self, entity_type: EntityType, id: &str) -> Option<ProcessStatus> {
        self.processed_ledger
            .get(&(entity_type, id.to_string()))
            .map(|entry| entry.status)
    }

    pub fn upsert_partial(&mut self, id: &str, data: PartialResult) {
        self.partial_cache.insert(id.to_string(), data);
    }

    pub fn get_partial(&self, id: &str) -> Option<&PartialResult> {
        self.partial_cache.get(id)
    }

    /// Remove a partial entry; no-op if absent.
    pub fn remove_partial(&mut self, id: &str) {
        self.partial_cache.remove(id);
    }

    /// Finish a player: ledger entry, stored result, partial entry dropped.
    pub fn complete_player(&mut self, result: PlayerResult) {
        let id = result.player.id.clone();
        self.mark_processed(EntityType::Player, &id, ProcessStatus::Completed);
        self.remove_partial(&id);
        self.results.insert(id, result);
    }

    /// Mark a player failed. Any partial work is kept for the next attempt.
    pub fn fail_player(&mut self, id: &str) {
        self.mark_processed(EntityType::Player, id, ProcessStatus::Failed);
    }

    pub fn player_result(&self, id: &str) -> Option<&PlayerResult> {
        self.results.get(id)
    }

    pub fn summary(&self) -> LedgerSummary {
        let mut summary = LedgerSummary {
            partial_entries: self.partial_cache.len(),
            ..Default::default()
        };
        for entry in self.processed_ledger.values() {
            match (entry.entity_type, entry.status) {
                (EntityType::Club, ProcessStatus::Completed) => summary.clubs_completed += 1,
                (EntityType::Club, ProcessStatus::Failed) => summary.clubs_failed += 1,
                (EntityType::Player, ProcessStatus::Completed) => summary.players_completed += 1,
                (EntityType::Player, ProcessStatus::Failed) => summary.players_failed += 1,
            }
        }
        summary
    }

    /// Check that a resumed run matches the run that wrote this checkpoint.
    ///
    /// Scope changes (prefix, output format) are errors. Concurrency changes
    /// are returned as warnings.
    pub fn check_compatible(&self, current: &RunSnapshot) -> Result<Vec<String>> {
        if self.config.filter_prefix != current.filter_prefix {
            return Err(ScanError::ConfigMismatch {
                field: "filter_prefix",
                checkpoint: self.config.filter_prefix.clone(),
                current: current.filter_prefix.clone(),
            });
        }
        if self.config.output_format != current.output_format {
            return Err(ScanError::ConfigMismatch {
                field: "output_format",
                checkpoint: self.config.output_format.to_string(),
                current: current.output_format.to_string(),
            });
        }

        let mut warnings = Vec::new();
        if self.config.concurrency != current.concurrency {
            warnings.push(format!(
                "concurrency changed from {} to {}",
                self.config.concurrency, current.concurrency
            ));
        }
        Ok(warnings)
    }
}

/// The ledger is stored as a JSON list of entries; loading folds duplicates
/// so the last entry for a key wins.
mod ledger_format {
    use super::{LedgerEntry, LedgerKey};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;

    pub fn serialize<S: Serializer>(
        ledger: &HashMap<LedgerKey, LedgerEntry>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut entries: Vec<&LedgerEntry> = ledger.values().collect();
        entries.sort_by(|a, b| {
            (a.entity_type, &a.entity_id).cmp(&(b.entity_type, &b.entity_id))
        });
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<LedgerKey, LedgerEntry>, D::Error> {
        let entries = Vec::<LedgerEntry>::deserialize(deserializer)?;
        let mut ledger = HashMap::with_capacity(entries.len());
        for entry in entries {
            ledger.insert((entry.entity_type, entry.entity_id.clone()), entry);
        }
        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> RunSnapshot {
        RunSnapshot {
            filter_prefix: "GER".to_string(),
            output_format: OutputFormat::Both,
            concurrency: 4,
        }
    }

    fn player(id: &str) -> Player {
        Player {
            id: id.to_string(),
            name: format!("Player {id}"),
            gender: None,
            birth_year: None,
            rating: Some(1500),
        }
    }

    fn context() -> ClubContext {
        ClubContext {
            club_id: "c1".to_string(),
            club_name: "Club One".to_string(),
        }
    }

    #[test]
    fn test_ledger_uniqueness() {
        let mut cp = Checkpoint::new(snapshot());
        cp.mark_processed(EntityType::Player, "p1", ProcessStatus::Failed);
        cp.mark_processed(EntityType::Player, "p1", ProcessStatus::Completed);
        cp.mark_processed(EntityType::Player, "p1", ProcessStatus::Failed);
        cp.mark_processed(EntityType::Club, "p1", ProcessStatus::Completed);

        assert_eq!(cp.processed_ledger.len(), 2);
        assert_eq!(
            cp.status(EntityType::Player, "p1"),
            Some(ProcessStatus::Failed)
        );
        assert!(!cp.is_processed(EntityType::Player, "p1"));
        assert!(cp.is_processed(EntityType::Club, "p1"));
    }

    #[test]
    fn test_duplicate_entries_fold_on_load() {
        let mut cp = Checkpoint::new(snapshot());
        cp.mark_processed(EntityType::Club, "c1", ProcessStatus::Completed);
        let mut value = serde_json::to_value(&cp).unwrap();

        let ledger = value["processedLedger"].as_array_mut().unwrap();
        let mut dup = ledger[0].clone();
        dup["status"] = serde_json::json!("failed");
        ledger.push(dup);

        let loaded: Checkpoint = serde_json::from_value(value).unwrap();
        assert_eq!(loaded.processed_ledger.len(), 1);
        assert_eq!(
            loaded.status(EntityType::Club, "c1"),
            Some(ProcessStatus::Failed)
        );
    }

    #[test]
    fn test_complete_player_drops_partial() {
        let mut cp = Checkpoint::new(snapshot());
        let mut partial = PartialResult::new(context(), player("p1"));
        partial.history = Some(Vec::new());
        cp.upsert_partial("p1", partial);
        assert!(cp.get_partial("p1").is_some());

        cp.complete_player(PlayerResult {
            context: context(),
            player: player("p1"),
            analysis: None,
        });

        assert!(cp.get_partial("p1").is_none());
        assert!(cp.is_processed(EntityType::Player, "p1"));
        assert!(cp.player_result("p1").is_some());
    }

    #[test]
    fn test_fail_player_keeps_partial() {
        let mut cp = Checkpoint::new(snapshot());
        cp.upsert_partial("p1", PartialResult::new(context(), player("p1")));
        cp.fail_player("p1");
        assert!(cp.get_partial("p1").is_some());
        cp.remove_partial("p1");
        cp.remove_partial("p1");
        assert!(cp.get_partial("p1").is_none());
    }

    #[test]
    fn test_check_compatible() {
        let cp = Checkpoint::new(snapshot());

        assert!(cp.check_compatible(&snapshot()).unwrap().is_empty());

        let faster = RunSnapshot {
            concurrency: 16,
            ..snapshot()
        };
        assert_eq!(cp.check_compatible(&faster).unwrap().len(), 1);

        let other_scope = RunSnapshot {
            filter_prefix: "FRA".to_string(),
            ..snapshot()
        };
        assert!(matches!(
            cp.check_compatible(&other_scope),
            Err(ScanError::ConfigMismatch {
                field: "filter_prefix",
                ..
            })
        ));

        let other_format = RunSnapshot {
            output_format: OutputFormat::Csv,
            ..snapshot()
        };
        assert!(matches!(
            cp.check_compatible(&other_format),
            Err(ScanError::ConfigMismatch {
                field: "output_format",
                ..
            })
        ));
    }

    #[test]
    fn test_summary_counts() {
        let mut cp = Checkpoint::new(snapshot());
        cp.mark_processed(EntityType::Club, "c1", ProcessStatus::Completed);
        cp.mark_processed(EntityType::Club, "c2", ProcessStatus::Failed);
        cp.mark_processed(EntityType::Player, "p1", ProcessStatus::Completed);
        cp.upsert_partial("p2", PartialResult::new(context(), player("p2")));

        let summary = cp.summary();
        assert_eq!(summary.clubs_completed, 1);
        assert_eq!(summary.clubs_failed, 1);
        assert_eq!(summary.players_completed, 1);
        assert_eq!(summary.players_failed, 0);
        assert_eq!(summary.partial_entries, 1);
    }
}
