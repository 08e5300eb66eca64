//! Named, independently persisted partitions

use crate::config::StoreConfig;
use crate::core::{Result, StoreError};
use crate::storage::persistence::{
    PartitionData, decode, encode, quarantine, read_partition_file, write_atomic,
};
use crate::storage::worker::{
    AutosaveStats, AutosaveWorker, FlushReport, FlushTarget, spawn_autosave_worker,
};
use std::any::Any;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::runtime::RuntimeFlavor;
use tracing::{debug, error, info, warn};

// ============================================================================
// Type-erased partitions
// ============================================================================

trait StoredPartition: Send + Sync {
    fn encode(&self) -> Result<Vec<u8>>;

    fn shared(&self) -> Arc<dyn Any + Send + Sync>;
}

struct Typed<T>(Arc<T>);

impl<T: PartitionData> StoredPartition for Typed<T> {
    fn encode(&self) -> Result<Vec<u8>> {
        encode(self.0.as_ref())
    }

    fn shared(&self) -> Arc<dyn Any + Send + Sync> {
        self.0.clone()
    }
}

type Loader = Box<dyn FnOnce(&str, &Path) -> Box<dyn StoredPartition> + Send>;

struct PartitionDef {
    name: String,
    path: PathBuf,
    load: Loader,
}

struct PartitionSlot {
    name: String,
    path: PathBuf,
    dirty: AtomicBool,
    value: Box<dyn StoredPartition>,
}

fn load_partition<T, F>(name: &str, path: &Path, default_factory: F) -> Arc<T>
where
    T: PartitionData,
    F: FnOnce() -> T,
{
    let bytes = match read_partition_file(path) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            debug!(partition = %name, path = %path.display(), "No stored data, using default");
            return Arc::new(default_factory());
        }
        Err(err) => {
            error!(partition = %name, error = %err, "Failed to read partition, using default");
            return Arc::new(default_factory());
        }
    };

    match decode::<T>(&bytes) {
        Ok(value) => {
            info!(partition = %name, bytes = bytes.len(), "Loaded partition");
            Arc::new(value)
        }
        Err(err) => {
            error!(partition = %name, error = %err, "Failed to decode partition, using default");
            match quarantine(path) {
                Ok(moved) => warn!(partition = %name, moved_to = %moved.display(), "Kept undecodable partition file"),
                Err(err) => error!(partition = %name, error = %err, "Failed to move undecodable partition file"),
            }
            Arc::new(default_factory())
        }
    }
}

// ============================================================================
// Shared state (owned jointly by the registry handle and the worker)
// ============================================================================

struct RegistryInner {
    config: StoreConfig,
    pending: Mutex<Vec<PartitionDef>>,
    partitions: OnceLock<BTreeMap<String, PartitionSlot>>,
    closed: AtomicBool,
    flush_lock: Mutex<()>,
}

impl RegistryInner {
    fn table(&self) -> Result<&BTreeMap<String, PartitionSlot>> {
        self.partitions.get().ok_or(StoreError::NotInitialized)
    }

    fn save_slot(&self, slot: &PartitionSlot) -> Result<()> {
        // Cleared before encoding: a mutation racing with this save re-marks
        // the partition and is picked up by the next pass.
        slot.dirty.store(false, Ordering::SeqCst);
        let result = slot
            .value
            .encode()
            .and_then(|bytes| write_atomic(&slot.path, &bytes));

        match &result {
            Ok(()) => debug!(partition = %slot.name, path = %slot.path.display(), "Saved partition"),
            Err(err) => {
                slot.dirty.store(true, Ordering::SeqCst);
                error!(
                    partition = %slot.name,
                    path = %slot.path.display(),
                    error = %err,
                    "Failed to save partition"
                );
            }
        }
        result
    }

    fn flush_pass(&self) -> FlushReport {
        let mut report = FlushReport::default();
        let Ok(table) = self.table() else {
            return report;
        };
        let _guard = self
            .flush_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        for slot in table.values() {
            if !slot.dirty.load(Ordering::SeqCst) {
                report.skipped += 1;
                continue;
            }
            match self.save_slot(slot) {
                Ok(()) => report.saved.push(slot.name.clone()),
                Err(_) => report.failed.push(slot.name.clone()),
            }
        }
        if !report.saved.is_empty() || !report.failed.is_empty() {
            debug!(saved = ?report.saved, failed = ?report.failed, "Flush pass finished");
        }
        report
    }
}

impl FlushTarget for RegistryInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn flush_dirty(&self) -> FlushReport {
        self.flush_pass()
    }
}

// ============================================================================
// PartitionRegistry
// ============================================================================

/// Lifecycle and durability authority for every named partition.
///
/// Partitions are registered, then the registry is initialized once: files
/// are loaded and the autosave worker starts. Callers fetch live partition
/// values with [`get`](Self::get), mutate them and call
/// [`mark_dirty`](Self::mark_dirty); the worker writes dirty partitions in
/// the background. [`shutdown`](Self::shutdown) stops the worker and then
/// flushes what is left. Dropping an initialized registry that was never shut
/// down performs the same ordered flush synchronously.
pub struct PartitionRegistry {
    inner: Arc<RegistryInner>,
    worker: Mutex<Option<AutosaveWorker>>,
}

impl PartitionRegistry {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                pending: Mutex::new(Vec::new()),
                partitions: OnceLock::new(),
                closed: AtomicBool::new(false),
                flush_lock: Mutex::new(()),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.inner.config.data_dir
    }

    /// Declare a partition stored in `file_name` under the data directory.
    ///
    /// `default_factory` supplies the value used when the file is missing,
    /// empty or unreadable. Must happen before [`initialize`](Self::initialize).
    pub fn register<T, F>(&self, name: &str, file_name: impl AsRef<Path>, default_factory: F) -> Result<()>
    where
        T: PartitionData,
        F: FnOnce() -> T + Send + 'static,
    {
        let mut pending = self.inner.pending.lock()?;
        if self.inner.partitions.get().is_some() {
            return Err(StoreError::AlreadyInitialized);
        }
        if pending.iter().any(|def| def.name == name) {
            return Err(StoreError::DuplicatePartition(name.to_string()));
        }

        pending.push(PartitionDef {
            name: name.to_string(),
            path: self.inner.config.data_dir.join(file_name),
            load: Box::new(move |name: &str, path: &Path| -> Box<dyn StoredPartition> {
                Box::new(Typed(load_partition(name, path, default_factory)))
            }),
        });
        Ok(())
    }

    /// Load every registered partition and start the autosave worker using
    /// the configured flush interval.
    pub async fn initialize(&self) -> Result<()> {
        self.initialize_with_interval(self.inner.config.flush_interval)
            .await
    }

    /// Same as [`initialize`](Self::initialize) with an explicit interval.
    pub async fn initialize_with_interval(&self, flush_interval: Duration) -> Result<()> {
        self.inner
            .config
            .clone()
            .flush_interval(flush_interval)
            .validate()?;

        self.load_all()?;

        let worker = spawn_autosave_worker(self.inner.clone(), flush_interval);
        *self.worker.lock()? = Some(worker);

        info!(
            data_dir = %self.inner.config.data_dir.display(),
            partitions = self.inner.table()?.len(),
            interval_secs = flush_interval.as_secs_f64(),
            "Partition registry initialized"
        );
        Ok(())
    }

    fn load_all(&self) -> Result<()> {
        let mut pending = self.inner.pending.lock()?;
        if self.inner.partitions.get().is_some() {
            return Err(StoreError::AlreadyInitialized);
        }

        let data_dir = &self.inner.config.data_dir;
        fs::create_dir_all(data_dir).map_err(|e| {
            StoreError::Io(format!(
                "Failed to create data directory '{}': {}",
                data_dir.display(),
                e
            ))
        })?;

        let mut table = BTreeMap::new();
        for def in pending.drain(..) {
            let value = (def.load)(&def.name, &def.path);
            table.insert(
                def.name.clone(),
                PartitionSlot {
                    name: def.name,
                    path: def.path,
                    dirty: AtomicBool::new(false),
                    value,
                },
            );
        }

        self.inner
            .partitions
            .set(table)
            .map_err(|_| StoreError::AlreadyInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.partitions.get().is_some()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.is_closed()
    }

    /// The live value of a partition. Mutations through it are visible to
    /// every other holder and are persisted once the partition is marked dirty.
    pub fn get<T: PartitionData>(&self, name: &str) -> Result<Arc<T>> {
        let slot = self
            .inner
            .table()?
            .get(name)
            .ok_or_else(|| StoreError::PartitionNotRegistered(name.to_string()))?;

        slot.value
            .shared()
            .downcast::<T>()
            .map_err(|_| StoreError::PartitionTypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Flag a partition for the next flush pass. Unknown names are ignored.
    pub fn mark_dirty(&self, name: &str) {
        match self.inner.table().ok().and_then(|table| table.get(name)) {
            Some(slot) => slot.dirty.store(true, Ordering::SeqCst),
            None => debug!(partition = %name, "mark_dirty on unknown partition ignored"),
        }
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.inner
            .table()
            .ok()
            .and_then(|table| table.get(name))
            .is_some_and(|slot| slot.dirty.load(Ordering::SeqCst))
    }

    pub fn partition_names(&self) -> Vec<String> {
        match self.inner.table() {
            Ok(table) => table.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn partition_path(&self, name: &str) -> Option<PathBuf> {
        self.inner
            .table()
            .ok()
            .and_then(|table| table.get(name))
            .map(|slot| slot.path.clone())
    }

    /// Write one partition now, whether dirty or not.
    pub fn save(&self, name: &str) -> Result<()> {
        let table = self.inner.table()?;
        let slot = table
            .get(name)
            .ok_or_else(|| StoreError::PartitionNotRegistered(name.to_string()))?;
        let _guard = self.inner.flush_lock.lock()?;
        self.inner.save_slot(slot)
    }

    /// Run one flush pass on the calling thread. Blocking.
    pub fn flush_dirty(&self) -> FlushReport {
        self.inner.flush_pass()
    }

    pub fn autosave_stats(&self) -> Option<AutosaveStats> {
        self.worker
            .lock()
            .ok()
            .and_then(|worker| worker.as_ref().map(AutosaveWorker::stats))
    }

    /// Stop the autosave worker, then flush every dirty partition.
    pub async fn shutdown(&self) -> Result<FlushReport> {
        if !self.is_initialized() {
            return Err(StoreError::NotInitialized);
        }
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::AlreadyShutDown);
        }

        let worker = self.worker.lock()?.take();
        if let Some(worker) = worker {
            worker.stop().await?;
        }

        let inner = self.inner.clone();
        let report = tokio::task::spawn_blocking(move || inner.flush_pass())
            .await
            .map_err(|err| StoreError::Worker(format!("shutdown flush: {}", err)))?;

        info!(saved = ?report.saved, failed = ?report.failed, "Partition registry shut down");
        Ok(report)
    }
}

impl Drop for PartitionRegistry {
    fn drop(&mut self) {
        if !self.is_initialized() || self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Worker first, so no new pass starts; the flush lock orders us after
        // a pass that is already running.
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        drop(worker);

        // File writes block; keep them off a multi-threaded runtime's worker
        // slot. A current-thread runtime has no other slot to move to.
        let inner = &self.inner;
        let report = match tokio::runtime::Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| inner.flush_pass())
            }
            _ => inner.flush_pass(),
        };
        if !report.saved.is_empty() || !report.failed.is_empty() {
            info!(saved = ?report.saved, failed = ?report.failed, "Flushed partitions on drop");
        }
    }
}
