//! Rating census pipeline.
//!
//! Pipeline flow:
//! Club list → Club queue → Club workers → Collector → Checkpoint
//!          → (join) → Group statistics → Ranked records → Reports
//!
//! The collector is the only consumer of worker outcomes. It saves the
//! checkpoint every `save_every` finished clubs. Percentiles are computed
//! only after every worker has been joined, over the full population.

use crate::checkpoint::{CheckpointStore, EntityType};
use crate::client::RatingSource;
use crate::models::{Club, Config, OutputRecord, PlayerResult, Result, RunSummary, ScanError};
use crate::pool::{ClubOutcome, ClubWorker, Phase, RunObserver};
use crate::report::{assemble_all, write_reports};
use crate::stats::GroupStatistics;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything a run produced.
#[derive(Debug)]
pub struct CensusOutput {
    /// Records sorted by (rank, player id)
    pub records: Vec<OutputRecord>,
    pub statistics: GroupStatistics,
    pub summary: RunSummary,
    /// Report files written; empty when the run stopped early
    pub reports: Vec<PathBuf>,
}

/// Bounded-concurrency census over the club → player hierarchy.
pub struct CensusPipeline {
    config: Config,
    source: Arc<dyn RatingSource>,
    store: Arc<CheckpointStore>,
    observer: Arc<dyn RunObserver>,
}

impl CensusPipeline {
    pub fn new(
        config: Config,
        source: Arc<dyn RatingSource>,
        store: Arc<CheckpointStore>,
        observer: Arc<dyn RunObserver>,
    ) -> Self {
        Self {
            config,
            source,
            store,
            observer,
        }
    }

    /// Run the census to completion or until `cancel` fires.
    ///
    /// Only a failed club listing or report write is an error. Per-club and
    /// per-player failures are recorded and counted in the summary. The
    /// checkpoint is removed only when every club was processed.
    pub async fn run(&self, cancel: CancellationToken) -> Result<CensusOutput> {
        let start = Instant::now();
        let settings = &self.config.run;

        self.enter(Phase::Discovery);
        let clubs = self
            .source
            .list_clubs(&settings.filter_prefix)
            .await
            .map_err(ScanError::ClubListUnavailable)?;

        let (done, outstanding): (Vec<Club>, Vec<Club>) = clubs
            .into_iter()
            .partition(|club| self.store.is_processed(EntityType::Club, &club.id));
        let total = done.len() + outstanding.len();

        // Completed clubs are not revisited; their players come from the checkpoint
        let done_ids: HashSet<&str> = done.iter().map(|c| c.id.as_str()).collect();
        let mut results: BTreeMap<String, PlayerResult> = self
            .store
            .completed_results()
            .into_iter()
            .filter(|r| done_ids.contains(r.context.club_id.as_str()))
            .map(|r| (r.player.id.clone(), r))
            .collect();

        self.store.set_progress(total, done.len());
        self.observer.on_clubs_discovered(total, outstanding.len());

        self.enter(Phase::Processing);
        let outstanding_count = outstanding.len();
        let finished = self.process(outstanding, &cancel, &mut results).await;
        let drained = finished == outstanding_count;

        self.save_checkpoint(done.len() + finished).await;

        self.enter(Phase::Statistics);
        let results: Vec<PlayerResult> = results.into_values().collect();
        let statistics = GroupStatistics::compute(
            results.iter().map(|r| &r.player),
            settings.reference_year(),
            settings.min_sample_size,
        );
        let records = assemble_all(&results, &statistics);

        let ledger = self.store.summary();
        let mut summary = RunSummary {
            total_clubs: total,
            skipped_clubs: done.len(),
            failed_clubs: ledger.clubs_failed,
            processed_players: results.len(),
            failed_players: ledger.players_failed,
            groups: statistics.groups.len(),
            excluded_groups: statistics.excluded.clone(),
            cancelled: !drained,
            runtime_secs: start.elapsed().as_secs_f64(),
            ..Default::default()
        };
        summary.finalize();

        let mut reports = Vec::new();
        if drained {
            reports = write_reports(
                &self.config.output.dir,
                self.config.output.format,
                &records,
                &statistics,
            )?;
            self.enter(Phase::Complete);
            if let Err(e) = CheckpointStore::cleanup(self.store.path()) {
                warn!(error = %e, "Failed to remove checkpoint after a complete run");
            }
        } else {
            info!(
                path = %self.store.path().display(),
                finished = done.len() + finished,
                total,
                "Run stopped early, checkpoint kept for resume"
            );
        }

        self.observer.on_finished(&summary);

        Ok(CensusOutput {
            records,
            statistics,
            summary,
            reports,
        })
    }

    /// Drain `outstanding` through the worker pool.
    ///
    /// Returns the number of clubs finished (completed or failed).
    async fn process(
        &self,
        outstanding: Vec<Club>,
        cancel: &CancellationToken,
        results: &mut BTreeMap<String, PlayerResult>,
    ) -> usize {
        let concurrency = self.config.run.concurrency.max(1);
        let save_every = self.config.run.save_every.max(1);
        let capacity = concurrency * 2;

        let (club_tx, club_rx) = mpsc::channel::<Club>(capacity);
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<ClubOutcome>(capacity);
        let queue = Arc::new(Mutex::new(club_rx));

        let feeder_cancel = cancel.clone();
        let feeder = tokio::spawn(async move {
            for club in outstanding {
                tokio::select! {
                    biased;
                    _ = feeder_cancel.cancelled() => break,
                    sent = club_tx.send(club) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let worker = Arc::new(ClubWorker::new(
            Arc::clone(&self.source),
            Arc::clone(&self.store),
            Arc::clone(&self.observer),
            self.config.run.cutoff(),
        ));

        let mut workers = JoinSet::new();
        for worker_id in 0..concurrency {
            let worker = Arc::clone(&worker);
            let queue = Arc::clone(&queue);
            let outcomes = outcome_tx.clone();
            let cancel = cancel.clone();

            workers.spawn(async move {
                loop {
                    let next = {
                        let mut rx = queue.lock().await;
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            club = rx.recv() => club,
                        }
                    };
                    let Some(club) = next else { break };

                    let outcome = worker.process_club(&club).await;
                    if outcomes.send(outcome).await.is_err() {
                        break;
                    }
                }
                debug!(worker_id, "Worker stopped");
            });
        }
        drop(outcome_tx);

        let mut finished = 0;
        while let Some(outcome) = outcome_rx.recv().await {
            finished += 1;
            self.store.increment_processed();
            self.observer.on_club_finished(&outcome);
            for result in outcome.results {
                results.insert(result.player.id.clone(), result);
            }

            if finished % save_every == 0 {
                self.save_checkpoint(finished).await;
            }
        }

        // Join barrier: nothing downstream runs while a worker is alive
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Worker task failed");
            }
        }
        if let Err(e) = feeder.await {
            warn!(error = %e, "Club feeder failed");
        }

        finished
    }

    fn enter(&self, phase: Phase) {
        self.store.set_phase(phase.as_str());
        self.observer.on_phase(phase);
    }

    /// Save off the async runtime. Failures are reported, never fatal.
    async fn save_checkpoint(&self, completed_clubs: usize) {
        let store = Arc::clone(&self.store);
        let saved = tokio::task::spawn_blocking(move || store.save())
            .await
            .map_err(|e| ScanError::Internal(format!("Checkpoint save task failed: {}", e)))
            .and_then(|saved| saved);

        match saved {
            Ok(()) => self.observer.on_checkpoint_saved(completed_clubs),
            Err(e) => self.observer.on_checkpoint_error(&e),
        }
    }
}
