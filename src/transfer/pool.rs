//! Transfer Pool: bounded concurrency over Transfer Workers with per-source duplicate-submit
//! rejection and a single completion channel drained by the coordinator (channels over
//! per-worker callbacks, per the design note — this is what lets the write-lock release and
//! stats fold happen on the coordinator thread instead of the worker thread).

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::transfer::worker::TransferWorker;
use crate::types::TransferResult;

/// Shared state cloned into each worker thread; `TransferPool` is a thin handle around it so
/// callers don't need to wrap the pool itself in an `Arc`.
struct Inner {
    max_workers: usize,
    in_flight: Mutex<HashSet<PathBuf>>,
    active_count: AtomicUsize,
    workers: Mutex<Vec<Arc<TransferWorker>>>,
    result_tx: Sender<TransferResult>,
}

pub struct TransferPool {
    inner: Arc<Inner>,
    result_rx: Receiver<TransferResult>,
}

impl TransferPool {
    pub fn new(max_workers: usize) -> Self {
        let (result_tx, result_rx) = unbounded();
        Self {
            inner: Arc::new(Inner {
                max_workers: max_workers.max(1),
                in_flight: Mutex::new(HashSet::new()),
                active_count: AtomicUsize::new(0),
                workers: Mutex::new(Vec::new()),
                result_tx,
            }),
            result_rx,
        }
    }

    pub fn active_count(&self) -> usize {
        self.inner.active_count.load(Ordering::SeqCst)
    }

    pub fn has_capacity(&self) -> bool {
        self.active_count() < self.inner.max_workers
    }

    /// Enqueue `worker` for execution on a pool thread. Returns `false` (without enqueuing)
    /// if the pool has no free slot or the worker's source path is already in flight.
    pub fn submit(&self, worker: Arc<TransferWorker>) -> bool {
        if !self.has_capacity() {
            return false;
        }
        {
            let mut in_flight = self.inner.in_flight.lock().unwrap();
            if in_flight.contains(&worker.source_path) {
                return false;
            }
            in_flight.insert(worker.source_path.clone());
        }

        self.inner.active_count.fetch_add(1, Ordering::SeqCst);
        self.inner.workers.lock().unwrap().push(Arc::clone(&worker));

        let inner = Arc::clone(&self.inner);
        std::thread::spawn(move || {
            let source_path = worker.source_path.clone();
            let result = worker.run();
            let _ = inner.result_tx.send(result);
            inner.in_flight.lock().unwrap().remove(&source_path);
            inner.active_count.fetch_sub(1, Ordering::SeqCst);
            inner.workers.lock().unwrap().retain(|w| !Arc::ptr_eq(w, &worker));
        });
        true
    }

    /// Pop the next completed result, or `None` on timeout. Polling with a short sleep is
    /// acceptable; this uses a blocking receive with a deadline instead.
    pub fn wait_for_any(&self, timeout: Duration) -> Option<TransferResult> {
        self.result_rx.recv_timeout(timeout).ok()
    }

    /// Block until no work is outstanding, then return (and clear) all remaining results.
    pub fn wait_for_all(&self) -> Vec<TransferResult> {
        let mut results = Vec::new();
        while self.active_count() > 0 {
            if let Ok(r) = self.result_rx.recv_timeout(Duration::from_millis(50)) {
                results.push(r);
            }
        }
        while let Ok(r) = self.result_rx.try_recv() {
            results.push(r);
        }
        results
    }

    /// Cancel every currently-recorded worker. Subsequent submissions are still accepted
    /// unless the caller stops submitting.
    pub fn cancel_all(&self) {
        for worker in self.inner.workers.lock().unwrap().iter() {
            worker.cancel();
        }
    }
}
