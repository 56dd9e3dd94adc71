//! Scoped persistent key-value storage.
//!
//! One flat JSON document backs the whole store.  [`Storage`] handles are
//! hierarchical views over it: a child scope prefixes every key with
//! `<prefix>.`, so a module's keys can never collide with another module's
//! by construction.
//!
//! # Auto-save
//!
//! Every `set`/`delete` schedules a flush.  Flushes coalesce: while one is
//! pending nothing new is scheduled, and a flush runs no sooner than the
//! debounce interval after the previous one.  A burst of N writes inside
//! one window therefore costs exactly one flush, and that flush serializes
//! whatever the store holds at flush time, which subsumes every earlier
//! write.
//!
//! # Load failures
//!
//! Loading happens once at boot.  A document that fails to parse logs a
//! warning and resets the store to empty — nothing written by this process
//! can be lost at that point.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, error, warn};

struct FlushState {
    last_flush: Option<Instant>,
    pending: bool,
}

struct StoreInner {
    path: PathBuf,
    interval: Duration,
    values: Mutex<Map<String, Value>>,
    flush: Mutex<FlushState>,
    flush_count: AtomicU64,
}

impl StoreInner {
    /// Schedules the coalesced auto-save.
    fn schedule_flush(inner: &Arc<Self>) {
        let delay = {
            let mut state = inner.flush.lock();
            if state.pending {
                return;
            }
            state.pending = true;
            match state.last_flush {
                Some(at) => inner.interval.saturating_sub(at.elapsed()),
                None => Duration::ZERO,
            }
        };

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = inner.flush().await {
                error!(path = %inner.path.display(), error = %e, "Storage auto-save failed");
            }
        });
    }

    async fn flush(&self) -> std::io::Result<()> {
        // Open the window before snapshotting: a write landing mid-flush
        // schedules its own deferred flush instead of being dropped.
        {
            let mut state = self.flush.lock();
            state.pending = false;
            state.last_flush = Some(Instant::now());
        }
        let payload = {
            let values = self.values.lock();
            serde_json::to_vec(&*values)?
        };
        tokio::fs::write(&self.path, payload).await?;
        self.flush_count.fetch_add(1, Ordering::SeqCst);
        debug!(path = %self.path.display(), "Storage flushed");
        Ok(())
    }
}

/// Owner of the backing document; produces [`Storage`] scopes.
pub struct StorageService {
    inner: Arc<StoreInner>,
}

impl StorageService {
    /// Creates a service over `path` with the given debounce interval.
    /// The store starts empty; call [`load`](Self::load) once at boot.
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                path: path.into(),
                interval,
                values: Mutex::new(Map::new()),
                flush: Mutex::new(FlushState {
                    last_flush: None,
                    pending: false,
                }),
                flush_count: AtomicU64::new(0),
            }),
        }
    }

    /// Loads the persisted document.  A missing file starts a fresh store;
    /// a document that fails to parse logs a warning and resets to empty.
    pub async fn load(&self) {
        match tokio::fs::read(&self.inner.path).await {
            Ok(bytes) => match serde_json::from_slice::<Map<String, Value>>(&bytes) {
                Ok(values) => {
                    debug!(
                        path = %self.inner.path.display(),
                        keys = values.len(),
                        "Storage loaded"
                    );
                    *self.inner.values.lock() = values;
                }
                Err(e) => {
                    warn!(
                        path = %self.inner.path.display(),
                        error = %e,
                        "Persisted storage failed to parse, resetting to empty"
                    );
                    self.inner.values.lock().clear();
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.inner.path.display(), "No persisted storage, starting fresh");
            }
            Err(e) => {
                warn!(
                    path = %self.inner.path.display(),
                    error = %e,
                    "Failed to read persisted storage, starting fresh"
                );
            }
        }
        // Memory now matches disk (or disk is unusable either way), so the
        // first debounce window starts here.
        self.inner.flush.lock().last_flush = Some(Instant::now());
    }

    /// Forces an immediate flush, outside the debounce schedule.
    pub async fn flush(&self) -> std::io::Result<()> {
        self.inner.flush().await
    }

    /// Number of physical flushes performed so far.
    pub fn flush_count(&self) -> u64 {
        self.inner.flush_count.load(Ordering::SeqCst)
    }

    /// The root scope (no prefix).
    pub fn root(&self) -> Storage {
        Storage {
            inner: Arc::clone(&self.inner),
            prefix: String::new(),
        }
    }
}

/// One hierarchical view over the store.  Cloneable and cheap; deriving a
/// child scope has no side effects.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<StoreInner>,
    prefix: String,
}

impl Storage {
    /// Derives a child scope whose keys live under `<prefix>.`.
    pub fn child(&self, prefix: &str) -> Storage {
        Storage {
            inner: Arc::clone(&self.inner),
            prefix: format!("{}{}.", self.prefix, prefix),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Reads and deserializes a value.  Absent keys and values that no
    /// longer match `T` both yield `None` (the latter with a warning, since
    /// it means the stored shape drifted).
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full = self.full_key(key);
        let value = self.inner.values.lock().get(&full).cloned()?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key = %full, error = %e, "Stored value does not match requested type");
                None
            }
        }
    }

    /// Stores a value and schedules the debounced auto-save.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        let full = self.full_key(key);
        match serde_json::to_value(value) {
            Ok(v) => {
                self.inner.values.lock().insert(full, v);
                StoreInner::schedule_flush(&self.inner);
            }
            Err(e) => {
                warn!(key = %full, error = %e, "Value is not serializable, not stored");
            }
        }
    }

    /// Removes a value, reporting whether one existed.  Schedules the
    /// auto-save only when something was actually removed.
    pub fn delete(&self, key: &str) -> bool {
        let existed = self
            .inner
            .values
            .lock()
            .remove(&self.full_key(key))
            .is_some();
        if existed {
            StoreInner::schedule_flush(&self.inner);
        }
        existed
    }
}
