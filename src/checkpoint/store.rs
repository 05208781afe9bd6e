//! Durable, concurrency-safe checkpoint store.
//!
//! - State lives behind an `RwLock`; every critical section is a single
//!   field update or a clone, and never spans an `.await`
//! - `save` serializes a cloned snapshot, so writers never wait on JSON
//!   encoding or disk IO
//! - Saves are atomic: write a uniquely named temp file in the same
//!   directory, fsync, then rename over the destination
//! - Stray temp files from a crash are removed on load

use crate::checkpoint::{
    Checkpoint, EntityType, LedgerSummary, PartialResult, ProcessStatus, RunSnapshot,
};
use crate::models::{PlayerResult, Result, ScanError};
use chrono::Utc;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Thread-safe owner of a run's [`Checkpoint`].
///
/// Callers never lock anything themselves; every method takes `&self`.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    state: RwLock<Checkpoint>,
    /// Serializes concurrent `save` calls
    save_lock: Mutex<()>,
}

impl CheckpointStore {
    /// Wrap an in-memory checkpoint that will be persisted at `path`.
    pub fn new(path: impl Into<PathBuf>, checkpoint: Checkpoint) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(checkpoint),
            save_lock: Mutex::new(()),
        }
    }

    /// Open the store for a run.
    ///
    /// With `resume`, an existing checkpoint is loaded and checked against
    /// `snapshot`: a scope mismatch is fatal, a concurrency change is only
    /// logged. A missing or unreadable checkpoint starts a fresh run.
    pub fn open(path: &Path, snapshot: RunSnapshot, resume: bool) -> Result<Self> {
        if !resume {
            if path.exists() {
                info!(path = %path.display(), "Ignoring existing checkpoint, starting fresh");
            }
            return Ok(Self::new(path, Checkpoint::new(snapshot)));
        }

        match Self::load(path) {
            Ok(mut checkpoint) => {
                for warning in checkpoint.check_compatible(&snapshot)? {
                    warn!(path = %path.display(), "Resuming with changed settings: {warning}");
                }
                let summary = checkpoint.summary();
                info!(
                    run_id = %checkpoint.run_id,
                    phase = %checkpoint.progress.current_phase,
                    clubs_completed = summary.clubs_completed,
                    players_completed = summary.players_completed,
                    players_failed = summary.players_failed,
                    partial = summary.partial_entries,
                    "Resuming from checkpoint"
                );
                checkpoint.config.concurrency = snapshot.concurrency;
                Ok(Self::new(path, checkpoint))
            }
            Err(ScanError::CheckpointNotFound(_)) => {
                info!(path = %path.display(), "No checkpoint found, starting fresh");
                Ok(Self::new(path, Checkpoint::new(snapshot)))
            }
            Err(e @ ScanError::CheckpointCorrupt { .. }) => {
                warn!(error = %e, "Checkpoint unreadable, starting fresh");
                Ok(Self::new(path, Checkpoint::new(snapshot)))
            }
            Err(e) => Err(e),
        }
    }

    /// Load a checkpoint from disk.
    pub fn load(path: &Path) -> Result<Checkpoint> {
        remove_stale_temp_files(path);

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ScanError::CheckpointNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ScanError::io("opening checkpoint", e)),
        };

        serde_json::from_reader(BufReader::new(file)).map_err(|e| ScanError::CheckpointCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Persist the current state atomically.
    pub fn save(&self) -> Result<()> {
        let _guard = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Only the clone runs under the lock; serializing works on the copy
        self.write(|cp| cp.timestamp = Utc::now());
        let checkpoint = self.snapshot();
        let bytes = serde_json::to_vec_pretty(&checkpoint)
            .map_err(|e| ScanError::Internal(format!("Serializing checkpoint: {e}")))?;

        write_atomic(&self.path, &bytes)?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "Checkpoint saved");
        Ok(())
    }

    /// Delete a checkpoint file; no-op if it does not exist.
    pub fn cleanup(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "Checkpoint removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ScanError::io("removing checkpoint", e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read<R>(&self, f: impl FnOnce(&Checkpoint) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut Checkpoint) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn mark_processed(&self, entity_type: EntityType, id: &str, status: ProcessStatus) {
        self.write(|cp| cp.mark_processed(entity_type, id, status));
    }

    pub fn is_processed(&self, entity_type: EntityType, id: &str) -> bool {
        self.read(|cp| cp.is_processed(entity_type, id))
    }

    pub fn upsert_partial(&self, id: &str, data: PartialResult) {
        self.write(|cp| cp.upsert_partial(id, data));
    }

    pub fn get_partial(&self, id: &str) -> Option<PartialResult> {
        self.read(|cp| cp.get_partial(id).cloned())
    }

    pub fn remove_partial(&self, id: &str) {
        self.write(|cp| cp.remove_partial(id));
    }

    /// Mark a player completed, store its result, drop its partial entry.
    pub fn complete_player(&self, result: PlayerResult) {
        self.write(|cp| cp.complete_player(result));
    }

    pub fn fail_player(&self, id: &str) {
        self.write(|cp| cp.fail_player(id));
    }

    /// Stored result of a completed player.
    ///
    /// `None` when the player is not completed or its result is missing.
    pub fn completed_result(&self, id: &str) -> Option<PlayerResult> {
        self.read(|cp| {
            if cp.is_processed(EntityType::Player, id) {
                cp.player_result(id).cloned()
            } else {
                None
            }
        })
    }

    /// Results of every completed player.
    pub fn completed_results(&self) -> Vec<PlayerResult> {
        self.read(|cp| {
            cp.results
                .iter()
                .filter(|(id, _)| cp.is_processed(EntityType::Player, id))
                .map(|(_, r)| r.clone())
                .collect()
        })
    }

    pub fn set_phase(&self, phase: &str) {
        self.write(|cp| cp.progress.current_phase = phase.to_string());
    }

    pub fn set_progress(&self, total: usize, processed: usize) {
        self.write(|cp| {
            cp.progress.total_entities = total;
            cp.progress.processed_entities = processed;
        });
    }

    pub fn increment_processed(&self) {
        self.write(|cp| cp.progress.processed_entities += 1);
    }

    pub fn summary(&self) -> LedgerSummary {
        self.read(Checkpoint::summary)
    }

    /// Copy of the full state.
    pub fn snapshot(&self) -> Checkpoint {
        self.read(Checkpoint::clone)
    }
}

/// Write `bytes` to `path` via temp file + rename.
///
/// The destination is never left half-written; on failure the temp file is
/// removed and the error returned.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| ScanError::io("creating checkpoint dir", e))?;

    let temp_path = temp_path_for(path, &dir);

    let written = (|| -> std::io::Result<()> {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(ScanError::io("writing temp checkpoint", e));
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        if let Err(rm) = fs::remove_file(&temp_path) {
            warn!(path = %temp_path.display(), error = %rm, "Failed to remove temp checkpoint");
        }
        return Err(ScanError::io("renaming checkpoint", e));
    }

    Ok(())
}

fn temp_path_for(path: &Path, dir: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkpoint".to_string());
    dir.join(format!("{name}.{}.tmp", Uuid::new_v4().simple()))
}

/// Remove `<checkpoint>.*.tmp` files left behind by an interrupted save.
fn remove_stale_temp_files(path: &Path) {
    let pattern = format!("{}.*.tmp", glob::Pattern::escape(&path.to_string_lossy()));
    let Ok(paths) = glob::glob(&pattern) else {
        return;
    };
    for stale in paths.filter_map(|p| p.ok()) {
        match fs::remove_file(&stale) {
            Ok(()) => warn!(path = %stale.display(), "Removed stale temp checkpoint"),
            Err(e) => warn!(path = %stale.display(), error = %e, "Could not remove stale temp checkpoint"),
        }
    }
}
