//! Club worker.
//!
//! Epistemic foundation:
//! - K_i: One worker owns a club until it is marked completed or failed
//! - B_i: Each roster or history fetch may fail → `SourceError`
//! - I^B: A missing history is known-absent, not a failure
//!
//! Processes one club at a time:
//! - Fetch the player list; on failure the club is marked failed
//! - For each player, reuse a stored result, else resume from the partial
//!   cache, else fetch the history and analyze it
//! - Every intermediate step lands in the partial cache before moving on
//! - The club is marked completed once every player was attempted

use crate::checkpoint::{CheckpointStore, EntityType, PartialResult, ProcessStatus};
use crate::client::RatingSource;
use crate::models::{Club, ClubContext, Player, PlayerResult, SourceError};
use crate::pool::RunObserver;
use crate::stats::analyze;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

/// What happened to one club.
#[derive(Debug, Clone, Default)]
pub struct ClubOutcome {
    pub club_id: String,
    /// Player list could not be fetched
    pub roster_failed: bool,
    /// Players completed in this pass, reused ones included
    pub completed: usize,
    /// Players whose stored result was reused
    pub reused: usize,
    pub failed: usize,
    pub results: Vec<PlayerResult>,
}

/// Processes clubs against a rating source, recording progress in the
/// checkpoint store.
pub struct ClubWorker {
    source: Arc<dyn RatingSource>,
    store: Arc<CheckpointStore>,
    observer: Arc<dyn RunObserver>,
    cutoff: NaiveDate,
}

impl ClubWorker {
    pub fn new(
        source: Arc<dyn RatingSource>,
        store: Arc<CheckpointStore>,
        observer: Arc<dyn RunObserver>,
        cutoff: NaiveDate,
    ) -> Self {
        Self {
            source,
            store,
            observer,
            cutoff,
        }
    }

    /// Process every player of `club`.
    pub async fn process_club(&self, club: &Club) -> ClubOutcome {
        let mut outcome = ClubOutcome {
            club_id: club.id.clone(),
            ..Default::default()
        };

        let players = match self.source.list_players(&club.id).await {
            Ok(players) => players,
            Err(e) => {
                debug!(club_id = %club.id, error = %e, "Player list fetch failed");
                self.store
                    .mark_processed(EntityType::Club, &club.id, ProcessStatus::Failed);
                outcome.roster_failed = true;
                return outcome;
            }
        };

        let context = ClubContext::from(club);
        for player in players {
            let player_id = player.id.clone();
            match self.process_player(&context, player).await {
                Ok((result, reused)) => {
                    outcome.completed += 1;
                    if reused {
                        outcome.reused += 1;
                    }
                    outcome.results.push(result);
                }
                Err(e) => {
                    self.store.fail_player(&player_id);
                    self.observer.on_player_failed(&club.id, &player_id, &e);
                    outcome.failed += 1;
                }
            }
        }

        self.store
            .mark_processed(EntityType::Club, &club.id, ProcessStatus::Completed);
        outcome
    }

    /// Bring one player to `completed`.
    ///
    /// Returns the result and whether it was reused from the checkpoint.
    async fn process_player(
        &self,
        context: &ClubContext,
        player: Player,
    ) -> Result<(PlayerResult, bool), SourceError> {
        if let Some(done) = self.store.completed_result(&player.id) {
            return Ok((done, true));
        }

        let mut partial = match self.store.get_partial(&player.id) {
            Some(mut cached) => {
                debug!(player_id = %player.id, "Resuming from partial cache");
                cached.context = context.clone();
                cached.player = player;
                cached
            }
            None => PartialResult::new(context.clone(), player),
        };
        let player_id = partial.player.id.clone();

        if partial.analysis.is_none() {
            let history = match partial.history.take() {
                Some(history) => history,
                None => {
                    let history = match self.source.fetch_history(&player_id).await {
                        Ok(history) => history,
                        Err(e) if e.is_not_found() => Vec::new(),
                        Err(e) => return Err(e),
                    };
                    partial.history = Some(history.clone());
                    self.store.upsert_partial(&player_id, partial.clone());
                    history
                }
            };

            partial.analysis = analyze(&history, self.cutoff);
            partial.history = Some(history);
            if partial.analysis.is_some() {
                self.store.upsert_partial(&player_id, partial.clone());
            }
        }

        let result = PlayerResult {
            context: partial.context,
            player: partial.player,
            analysis: partial.analysis,
        };
        self.store.complete_player(result.clone());
        Ok((result, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{Checkpoint, RunSnapshot};
    use crate::client::MemorySource;
    use crate::models::{Gender, OutputFormat, RatingPoint};
    use crate::pool::NoopObserver;

    fn store() -> Arc<CheckpointStore> {
        Arc::new(CheckpointStore::new(
            "unused.json",
            Checkpoint::new(RunSnapshot {
                filter_prefix: String::new(),
                output_format: OutputFormat::Json,
                concurrency: 1,
            }),
        ))
    }

    fn club() -> Club {
        Club {
            id: "c1".to_string(),
            name: "Club One".to_string(),
        }
    }

    fn player(id: &str) -> Player {
        Player {
            id: id.to_string(),
            name: id.to_string(),
            gender: Some(Gender::Male),
            birth_year: Some(1990),
            rating: Some(1600),
        }
    }

    fn history() -> Vec<RatingPoint> {
        vec![RatingPoint {
            period: NaiveDate::from_ymd_opt(2023, 5, 1).unwrap(),
            rating: 1600,
            games: 10,
            points: 6.0,
        }]
    }

    fn cutoff() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn worker(source: Arc<MemorySource>, store: Arc<CheckpointStore>) -> ClubWorker {
        ClubWorker::new(source, store, Arc::new(NoopObserver), cutoff())
    }

    #[tokio::test]
    async fn test_club_completes_players() {
        let source = Arc::new(
            MemorySource::new()
                .with_club(club(), vec![player("p1"), player("p2")])
                .with_history("p1", history()),
        );
        let store = store();
        let outcome = worker(source, Arc::clone(&store)).process_club(&club()).await;

        assert_eq!(outcome.completed, 2);
        assert_eq!(outcome.failed, 0);
        assert!(store.is_processed(EntityType::Club, "c1"));

        // p2 has no history: completed without analysis
        let p2 = store.completed_result("p2").unwrap();
        assert!(p2.analysis.is_none());
        let p1 = store.completed_result("p1").unwrap();
        assert_eq!(p1.analysis.unwrap().rating_at_cutoff, Some(1600));
        assert_eq!(store.summary().partial_entries, 0);
    }

    #[tokio::test]
    async fn test_failed_history_marks_player_failed() {
        let source = Arc::new(
            MemorySource::new()
                .with_club(club(), vec![player("p1")])
                .with_history("p1", history())
                .with_history_failures("p1", 1),
        );
        let store = store();
        let outcome = worker(source, Arc::clone(&store)).process_club(&club()).await;

        assert_eq!(outcome.failed, 1);
        assert!(!store.is_processed(EntityType::Player, "p1"));
        assert_eq!(store.summary().players_failed, 1);
        assert!(store.is_processed(EntityType::Club, "c1"));
    }

    #[tokio::test]
    async fn test_roster_failure_marks_club_failed() {
        let source = Arc::new(
            MemorySource::new()
                .with_club(club(), vec![player("p1")])
                .with_failing_roster("c1"),
        );
        let store = store();
        let outcome = worker(source, Arc::clone(&store)).process_club(&club()).await;

        assert!(outcome.roster_failed);
        assert!(!store.is_processed(EntityType::Club, "c1"));
        assert_eq!(store.summary().clubs_failed, 1);
    }

    #[tokio::test]
    async fn test_partial_history_skips_fetch() {
        let source = Arc::new(MemorySource::new().with_club(club(), vec![player("p1")]));
        let store = store();
        let mut partial = PartialResult::new(ClubContext::from(&club()), player("p1"));
        partial.history = Some(history());
        store.upsert_partial("p1", partial);

        let outcome = worker(Arc::clone(&source), Arc::clone(&store))
            .process_club(&club())
            .await;

        assert_eq!(outcome.completed, 1);
        assert_eq!(source.history_calls(), 0);
        assert!(store.completed_result("p1").unwrap().analysis.is_some());
        assert!(store.get_partial("p1").is_none());
    }

    #[tokio::test]
    async fn test_completed_player_reused() {
        let source = Arc::new(
            MemorySource::new()
                .with_club(club(), vec![player("p1")])
                .with_history("p1", history()),
        );
        let store = store();
        let w = worker(Arc::clone(&source), Arc::clone(&store));

        w.process_club(&club()).await;
        let second = w.process_club(&club()).await;

        assert_eq!(second.reused, 1);
        assert_eq!(source.history_calls(), 1);
    }
}
