//! `PersistentStore<T>` — debounced, atomic JSON persistence (§4.1).
//!
//! Grounded on the teacher's `stores::memory::MemoryStore` for the
//! `RwLock`-guarded-state shape, generalized from an in-memory cache to a
//! disk-backed, debounced writer since §4.1 requires durability.

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::{CoreResult, PersistenceError};

/// Running counters for a store's write activity (§4.1).
#[derive(Debug, Default)]
pub struct PersistenceStats {
    pub save_requests: AtomicU64,
    pub actual_writes: AtomicU64,
    pub failed_writes: AtomicU64,
    pub debounced_skips: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct PersistenceStatsSnapshot {
    pub save_requests: u64,
    pub actual_writes: u64,
    pub failed_writes: u64,
    pub debounced_skips: u64,
    pub last_write_time: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
}

enum DebounceMsg<T> {
    Save(T),
    Cancel,
}

/// Debounced, atomic, single-writer JSON persistence for one value of type
/// `T` at one path.
///
/// `save` coalesces bursts of writes into the last payload within
/// `debounce`; `save_immediate` bypasses the debounce entirely. All writes
/// go through a single background task, so concurrent callers are
/// serialized without the caller needing a lock.
pub struct PersistentStore<T> {
    path: PathBuf,
    debounce: Duration,
    stats: Arc<PersistenceStats>,
    last_write_time: Arc<Mutex<Option<chrono::DateTime<chrono::Utc>>>>,
    last_error: Arc<Mutex<Option<String>>>,
    tx: mpsc::UnboundedSender<DebounceMsg<T>>,
    flush_tx: mpsc::UnboundedSender<oneshot::Sender<()>>,
    inflight: Arc<Mutex<()>>,
}

impl<T> PersistentStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(path: impl Into<PathBuf>, debounce: Duration) -> Self {
        let path = path.into();
        let stats = Arc::new(PersistenceStats::default());
        let last_write_time = Arc::new(Mutex::new(None));
        let last_error = Arc::new(Mutex::new(None));
        let inflight = Arc::new(Mutex::new(()));

        let (tx, mut rx) = mpsc::unbounded_channel::<DebounceMsg<T>>();
        let (flush_tx, mut flush_rx) = mpsc::unbounded_channel::<oneshot::Sender<()>>();

        let worker_path = path.clone();
        let worker_stats = stats.clone();
        let worker_last_write = last_write_time.clone();
        let worker_last_error = last_error.clone();
        let worker_inflight = inflight.clone();
        let debounce_dur = debounce;

        tokio::spawn(async move {
            let mut pending: Option<T> = None;
            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        match msg {
                            Some(DebounceMsg::Save(value)) => {
                                if pending.is_some() {
                                    worker_stats.debounced_skips.fetch_add(1, Ordering::Relaxed);
                                }
                                pending = Some(value);
                            }
                            Some(DebounceMsg::Cancel) => {
                                pending = None;
                            }
                            None => break,
                        }
                    }
                    _ = tokio::time::sleep(debounce_dur), if pending.is_some() => {
                        if let Some(value) = pending.take() {
                            let _guard = worker_inflight.lock().await;
                            write_atomic(&worker_path, &value, &worker_stats, &worker_last_write, &worker_last_error).await;
                        }
                    }
                    Some(ack) = flush_rx.recv() => {
                        if let Some(value) = pending.take() {
                            let _guard = worker_inflight.lock().await;
                            write_atomic(&worker_path, &value, &worker_stats, &worker_last_write, &worker_last_error).await;
                        }
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self {
            path,
            debounce,
            stats,
            last_write_time,
            last_error,
            tx,
            flush_tx,
            inflight,
        }
    }

    /// Debounced save: coalesces with any pending save within `debounce`.
    pub fn save(&self, value: T) {
        self.stats.save_requests.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(DebounceMsg::Save(value));
    }

    /// Cancel any pending debounced write; already-in-flight writes still
    /// complete.
    pub fn cancel(&self) {
        let _ = self.tx.send(DebounceMsg::Cancel);
    }

    /// Force any pending debounced write to complete now.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.flush_tx.send(ack_tx).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Write `value` synchronously, bypassing the debounce queue entirely.
    /// Cancels any pending debounced write first.
    pub async fn save_immediate(&self, value: T) -> CoreResult<()> {
        self.stats.save_requests.fetch_add(1, Ordering::Relaxed);
        self.cancel();
        let _guard = self.inflight.lock().await;
        write_atomic(&self.path, &value, &self.stats, &self.last_write_time, &self.last_error)
            .await
            .map_err(Into::into)
    }

    pub async fn load(&self) -> CoreResult<Option<T>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|source| {
                    PersistenceError::Serialize {
                        path: self.path.display().to_string(),
                        source,
                    }
                })?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Io {
                path: self.path.display().to_string(),
                source,
            }
            .into()),
        }
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    pub async fn delete(&self) -> CoreResult<()> {
        self.cancel();
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(_) if !self.exists().await => Ok(()),
            Err(source) => Err(PersistenceError::Io {
                path: self.path.display().to_string(),
                source,
            }
            .into()),
        }
    }

    pub async fn stats(&self) -> PersistenceStatsSnapshot {
        PersistenceStatsSnapshot {
            save_requests: self.stats.save_requests.load(Ordering::Relaxed),
            actual_writes: self.stats.actual_writes.load(Ordering::Relaxed),
            failed_writes: self.stats.failed_writes.load(Ordering::Relaxed),
            debounced_skips: self.stats.debounced_skips.load(Ordering::Relaxed),
            last_write_time: *self.last_write_time.lock().await,
            last_error: self.last_error.lock().await.clone(),
        }
    }

    pub fn debounce_duration(&self) -> Duration {
        self.debounce
    }
}

async fn write_atomic<T: Serialize>(
    path: &Path,
    value: &T,
    stats: &PersistenceStats,
    last_write_time: &Mutex<Option<chrono::DateTime<chrono::Utc>>>,
    last_error: &Mutex<Option<String>>,
) -> Result<(), PersistenceError> {
    let result = write_atomic_inner(path, value).await;
    match &result {
        Ok(()) => {
            stats.actual_writes.fetch_add(1, Ordering::Relaxed);
            *last_write_time.lock().await = Some(chrono::Utc::now());
            *last_error.lock().await = None;
        }
        Err(e) => {
            stats.failed_writes.fetch_add(1, Ordering::Relaxed);
            *last_error.lock().await = Some(e.to_string());
            tracing::warn!(path = %path.display(), error = %e, "persistent store write failed");
        }
    }
    result
}

async fn write_atomic_inner<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| PersistenceError::Io {
                path: parent.display().to_string(),
                source,
            })?;
    }

    let json = serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Serialize {
        path: path.display().to_string(),
        source,
    })?;

    let unique = uuid::Uuid::new_v4();
    let timestamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let tmp_path = path.with_extension(format!("tmp.{timestamp}.{unique}"));

    let write_result = tokio::fs::write(&tmp_path, &json).await;
    if let Err(source) = write_result {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(PersistenceError::Io {
            path: tmp_path.display().to_string(),
            source,
        });
    }

    if let Err(source) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(PersistenceError::Io {
            path: path.display().to_string(),
            source,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Sample {
        value: u32,
    }

    #[tokio::test]
    async fn save_immediate_persists_and_loads() {
        let dir = tempdir();
        let path = dir.join("sample.json");
        let store: PersistentStore<Sample> = PersistentStore::new(&path, Duration::from_millis(50));

        store.save_immediate(Sample { value: 42 }).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, Some(Sample { value: 42 }));

        tokio::fs::remove_dir_all(dir).await.ok();
    }

    #[tokio::test]
    async fn debounced_saves_coalesce_to_latest() {
        let dir = tempdir();
        let path = dir.join("sample.json");
        let store: PersistentStore<Sample> = PersistentStore::new(&path, Duration::from_millis(20));

        store.save(Sample { value: 1 });
        store.save(Sample { value: 2 });
        store.save(Sample { value: 3 });
        store.flush().await;

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, Some(Sample { value: 3 }));

        let stats = store.stats().await;
        assert_eq!(stats.save_requests, 3);
        assert_eq!(stats.actual_writes, 1);
        assert_eq!(stats.debounced_skips, 2);

        tokio::fs::remove_dir_all(dir).await.ok();
    }

    #[tokio::test]
    async fn load_missing_file_returns_none() {
        let dir = tempdir();
        let path = dir.join("missing.json");
        let store: PersistentStore<Sample> = PersistentStore::new(&path, Duration::from_millis(20));
        assert_eq!(store.load().await.unwrap(), None);
        tokio::fs::remove_dir_all(dir).await.ok();
    }

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("crawlkit-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
