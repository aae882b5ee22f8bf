// ABOUTME: Generation record store keyed by id with per-record atomic updates
// ABOUTME: Optionally snapshots every change to a JSON file under the data directory

use crate::error::{Result, ServiceError};
use dashmap::DashMap;
use genui_core::{GenerationId, GenerationRecord, GenerationStatus};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

const SNAPSHOT_FILE: &str = "generations.json";
pub const INTERRUPTED_BY_RESTART: &str = "interrupted by restart";

type Records = DashMap<GenerationId, GenerationRecord>;

struct Snapshot {
    path: PathBuf,
    dirty: Arc<Notify>,
    closed: Arc<AtomicBool>,
    write_lock: Arc<Mutex<()>>,
}

/// In-memory record store. Every update of one record is a single atomic
/// read-modify-write, and a failed update leaves the record untouched.
pub struct GenerationStore {
    records: Arc<Records>,
    snapshot: Option<Snapshot>,
}

impl Default for GenerationStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl GenerationStore {
    pub fn in_memory() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            snapshot: None,
        }
    }

    /// Open a store persisted at `data_dir/generations.json`.
    ///
    /// Records left `pending` or `generating` by a previous process are failed
    /// with "interrupted by restart".
    pub async fn open(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(genui_core::GenUiError::from)?;
        let path = data_dir.join(SNAPSHOT_FILE);

        let records: Records = DashMap::new();
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let loaded: Vec<GenerationRecord> =
                    serde_json::from_slice(&bytes).map_err(genui_core::GenUiError::from)?;
                for record in loaded {
                    records.insert(record.id, record);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(genui_core::GenUiError::from(e).into()),
        }

        let mut recovered = 0usize;
        for mut entry in records.iter_mut() {
            if !entry.status.is_terminal() {
                fail_run(entry.value_mut(), INTERRUPTED_BY_RESTART)?;
                recovered += 1;
            }
        }

        let records = Arc::new(records);
        let dirty = Arc::new(Notify::new());
        let closed = Arc::new(AtomicBool::new(false));
        let write_lock = Arc::new(Mutex::new(()));
        spawn_writer(
            Arc::downgrade(&records),
            path.clone(),
            dirty.clone(),
            closed.clone(),
            write_lock.clone(),
        );

        info!(
            "Opened generation store at {} ({} records, {} interrupted)",
            path.display(),
            records.len(),
            recovered
        );

        let store = Self {
            records,
            snapshot: Some(Snapshot {
                path,
                dirty,
                closed,
                write_lock,
            }),
        };
        if recovered > 0 {
            store.flush().await?;
        }
        Ok(store)
    }

    pub fn is_persistent(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert a fresh `pending` record for `prompt`.
    pub fn create(&self, prompt: impl Into<String>) -> GenerationRecord {
        let record = GenerationRecord::new(prompt);
        self.records.insert(record.id, record.clone());
        self.mark_dirty();
        record
    }

    pub fn get(&self, id: GenerationId) -> Option<GenerationRecord> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    /// All records, newest first.
    pub fn list_all(&self) -> Vec<GenerationRecord> {
        let mut all: Vec<GenerationRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        all
    }

    /// Apply `mutator` to record `id` atomically.
    ///
    /// The mutator works on a copy that replaces the stored record only when it
    /// returns `Ok`, so concurrent updates of the same id never interleave and a
    /// rejected transition changes nothing.
    pub fn update<R, F>(&self, id: GenerationId, mutator: F) -> Result<(R, GenerationRecord)>
    where
        F: FnOnce(&mut GenerationRecord) -> genui_core::Result<R>,
    {
        let (value, updated) = {
            let mut entry = self
                .records
                .get_mut(&id)
                .ok_or(ServiceError::NotFound(id))?;
            let mut next = entry.clone();
            let value = mutator(&mut next)?;
            *entry = next.clone();
            (value, next)
        };
        self.mark_dirty();
        Ok((value, updated))
    }

    pub fn mark_generating(&self, id: GenerationId) -> Result<GenerationRecord> {
        self.update(id, |r| r.start()).map(|(_, r)| r)
    }

    pub fn mark_completed(&self, id: GenerationId, output_ref: &str) -> Result<GenerationRecord> {
        self.update(id, |r| r.complete(output_ref)).map(|(_, r)| r)
    }

    /// Fail a run that may not have reached `generating` yet.
    pub fn mark_failed(&self, id: GenerationId, error: &str) -> Result<GenerationRecord> {
        self.update(id, |r| fail_run(r, error)).map(|(_, r)| r)
    }

    /// Store progress, keeping the last known best score when the update has none.
    pub fn record_progress(
        &self,
        id: GenerationId,
        stage: &str,
        iteration: u32,
        best_score: Option<f64>,
    ) -> Result<GenerationRecord> {
        self.update(id, |r| {
            let best = best_score.or_else(|| r.progress.as_ref().and_then(|p| p.best_score));
            r.report_progress(stage, iteration, best);
            Ok(())
        })
        .map(|(_, r)| r)
    }

    /// Write the snapshot file now. No-op for in-memory stores.
    pub async fn flush(&self) -> Result<()> {
        if let Some(snapshot) = &self.snapshot {
            write_snapshot(&self.records, &snapshot.path, &snapshot.write_lock).await?;
        }
        Ok(())
    }

    fn mark_dirty(&self) {
        if let Some(snapshot) = &self.snapshot {
            snapshot.dirty.notify_one();
        }
    }
}

impl Drop for GenerationStore {
    fn drop(&mut self) {
        if let Some(snapshot) = &self.snapshot {
            snapshot.closed.store(true, Ordering::Release);
            snapshot.dirty.notify_one();
        }
    }
}

fn fail_run(record: &mut GenerationRecord, error: &str) -> genui_core::Result<()> {
    if record.status == GenerationStatus::Pending {
        record.start()?;
    }
    record.fail(error)
}

fn spawn_writer(
    records: Weak<Records>,
    path: PathBuf,
    dirty: Arc<Notify>,
    closed: Arc<AtomicBool>,
    lock: Arc<Mutex<()>>,
) {
    tokio::spawn(async move {
        loop {
            dirty.notified().await;
            if closed.load(Ordering::Acquire) {
                debug!("Generation store closed, snapshot writer exiting");
                break;
            }
            let Some(records) = records.upgrade() else {
                debug!("Generation store dropped, snapshot writer exiting");
                break;
            };
            if let Err(e) = write_snapshot(&records, &path, &lock).await {
                warn!("Failed to write generation snapshot {}: {}", path.display(), e);
            }
        }
    });
}

async fn write_snapshot(records: &Records, path: &Path, lock: &Mutex<()>) -> Result<()> {
    let _guard = lock.lock().await;

    let mut all: Vec<GenerationRecord> = records.iter().map(|r| r.value().clone()).collect();
    all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    let bytes = serde_json::to_vec_pretty(&all).map_err(genui_core::GenUiError::from)?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(genui_core::GenUiError::from)?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(genui_core::GenUiError::from)?;
    debug!("Wrote {} generation records to {}", all.len(), path.display());
    Ok(())
}
