//! Run observation.
//!
//! The engine never logs through a global; it reports to the
//! [`RunObserver`] it was constructed with. The binary installs
//! [`TracingObserver`], tests install their own.

use crate::models::{RunSummary, ScanError, SourceError};
use crate::pool::ClubOutcome;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use tracing::{debug, info, warn};

/// Run phase, also written to the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discovery,
    Processing,
    Statistics,
    Complete,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Processing => "processing",
            Self::Statistics => "statistics",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives run events. Every method defaults to doing nothing.
pub trait RunObserver: Send + Sync {
    fn on_phase(&self, _phase: Phase) {}

    /// `outstanding` of `total` clubs still need processing.
    fn on_clubs_discovered(&self, _total: usize, _outstanding: usize) {}

    fn on_club_finished(&self, _outcome: &ClubOutcome) {}

    fn on_player_failed(&self, _club_id: &str, _player_id: &str, _error: &SourceError) {}

    /// Called after each periodic or final save.
    fn on_checkpoint_saved(&self, _completed_clubs: usize) {}

    fn on_checkpoint_error(&self, _error: &ScanError) {}

    fn on_finished(&self, _summary: &RunSummary) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Structured logs plus a progress bar over clubs.
pub struct TracingObserver {
    progress: ProgressBar,
}

impl TracingObserver {
    pub fn new(show_progress: bool) -> Self {
        let progress = if show_progress {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} clubs ({percent}%) {msg}")
        {
            progress.set_style(style.progress_chars("##-"));
        }
        Self { progress }
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RunObserver for TracingObserver {
    fn on_phase(&self, phase: Phase) {
        info!(phase = %phase, "Entering phase");
    }

    fn on_clubs_discovered(&self, total: usize, outstanding: usize) {
        info!(
            total_clubs = total,
            outstanding,
            skipped = total - outstanding,
            "Clubs discovered"
        );
        self.progress.set_length(total as u64);
        self.progress.set_position((total - outstanding) as u64);
    }

    fn on_club_finished(&self, outcome: &ClubOutcome) {
        if outcome.roster_failed {
            warn!(club_id = %outcome.club_id, "Player list unavailable, club marked failed");
        } else {
            debug!(
                club_id = %outcome.club_id,
                completed = outcome.completed,
                reused = outcome.reused,
                failed = outcome.failed,
                "Club finished"
            );
        }
        self.progress.inc(1);
        self.progress.set_message(outcome.club_id.clone());
    }

    fn on_player_failed(&self, club_id: &str, player_id: &str, error: &SourceError) {
        warn!(club_id = %club_id, player_id = %player_id, error = %error, "Player failed");
    }

    fn on_checkpoint_saved(&self, completed_clubs: usize) {
        debug!(completed_clubs, "Checkpoint saved");
    }

    fn on_checkpoint_error(&self, error: &ScanError) {
        warn!(error = %error, "Checkpoint save failed, continuing");
    }

    fn on_finished(&self, summary: &RunSummary) {
        self.progress.finish_with_message(format!(
            "Done! {} players, {} failed",
            summary.processed_players, summary.failed_players
        ));
        info!(
            clubs = summary.total_clubs,
            players = summary.processed_players,
            failed = summary.failed_players,
            groups = summary.groups,
            excluded_groups = summary.excluded_groups.len(),
            cancelled = summary.cancelled,
            throughput = format!("{:.0}/hr", summary.throughput_per_hour),
            "Run complete"
        );
    }
}
