//! Background autosave worker

use crate::core::{Result, StoreError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

/// Outcome of one flush pass over the registry's partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Partitions written during the pass.
    pub saved: Vec<String>,
    /// Partitions whose save failed; they stay dirty for the next pass.
    pub failed: Vec<String>,
    /// Clean partitions that were left alone.
    pub skipped: usize,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What the worker flushes. Implemented by the registry.
pub trait FlushTarget: Send + Sync + 'static {
    /// Once true, the worker starts no further passes.
    fn is_closed(&self) -> bool;

    /// Save every dirty partition. Blocking.
    fn flush_dirty(&self) -> FlushReport;
}

/// Counters exposed by a running worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutosaveStats {
    pub passes: u64,
    pub partitions_saved: u64,
    pub errors: u64,
}

#[derive(Default)]
struct AutosaveCounters {
    passes: AtomicU64,
    partitions_saved: AtomicU64,
    errors: AtomicU64,
}

impl AutosaveCounters {
    fn record(&self, report: &FlushReport) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.partitions_saved
            .fetch_add(report.saved.len() as u64, Ordering::Relaxed);
        self.errors
            .fetch_add(report.failed.len() as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> AutosaveStats {
        AutosaveStats {
            passes: self.passes.load(Ordering::Relaxed),
            partitions_saved: self.partitions_saved.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Periodic flush task owned by the registry.
pub struct AutosaveWorker {
    counters: Arc<AutosaveCounters>,
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl AutosaveWorker {
    pub fn stats(&self) -> AutosaveStats {
        self.counters.snapshot()
    }

    /// Signals the worker to stop and waits for it to finish.
    ///
    /// A pass already in progress runs to completion first.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| StoreError::Worker(format!("autosave worker join: {}", err)))?;
        }
        Ok(())
    }
}

impl Drop for AutosaveWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Spawns the autosave task on the current tokio runtime.
///
/// The first pass runs one full `interval` after spawning. Each pass runs on
/// the blocking pool so file writes never stall async worker threads.
pub fn spawn_autosave_worker<F: FlushTarget>(target: Arc<F>, interval: Duration) -> AutosaveWorker {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let counters = Arc::new(AutosaveCounters::default());
    let worker_counters = counters.clone();

    let join_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    break;
                }
                _ = ticker.tick() => {
                    if target.is_closed() {
                        break;
                    }
                    let pass_target = target.clone();
                    match tokio::task::spawn_blocking(move || pass_target.flush_dirty()).await {
                        Ok(report) => {
                            if !report.is_clean() {
                                warn!(failed = ?report.failed, "Autosave pass left partitions dirty");
                            }
                            worker_counters.record(&report);
                        }
                        Err(err) => {
                            worker_counters.errors.fetch_add(1, Ordering::Relaxed);
                            error!(error = %err, "Autosave pass aborted");
                        }
                    }
                }
            }
        }
        debug!("Autosave worker stopped");
    });

    AutosaveWorker {
        counters,
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    #[derive(Default)]
    struct CountingTarget {
        closed: AtomicBool,
        passes: AtomicUsize,
    }

    impl FlushTarget for CountingTarget {
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        fn flush_dirty(&self) -> FlushReport {
            self.passes.fetch_add(1, Ordering::SeqCst);
            FlushReport {
                saved: vec!["counters".to_string()],
                failed: Vec::new(),
                skipped: 0,
            }
        }
    }

    #[tokio::test]
    async fn test_worker_runs_periodic_passes() {
        let target = Arc::new(CountingTarget::default());
        let worker = spawn_autosave_worker(target.clone(), Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(150)).await;
        let stats = worker.stats();
        worker.stop().await.unwrap();

        assert!(target.passes.load(Ordering::SeqCst) >= 2);
        assert!(stats.passes >= 2);
        assert_eq!(stats.partitions_saved, stats.passes);
        assert_eq!(stats.errors, 0);
    }

    #[tokio::test]
    async fn test_no_pass_after_stop() {
        let target = Arc::new(CountingTarget::default());
        let worker = spawn_autosave_worker(target.clone(), Duration::from_millis(20));
        worker.stop().await.unwrap();

        let passes = target.passes.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(target.passes.load(Ordering::SeqCst), passes);
    }

    #[tokio::test]
    async fn test_closed_target_ends_worker() {
        let target = Arc::new(CountingTarget::default());
        target.closed.store(true, Ordering::SeqCst);
        let mut worker = spawn_autosave_worker(target.clone(), Duration::from_millis(10));

        let handle = worker.join_handle.take().unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker should exit once the target is closed")
            .unwrap();
        assert_eq!(target.passes.load(Ordering::SeqCst), 0);
    }
}
