//! Decoder pool: a bounded blocking MPMC queue of warm workers
//!
//! One pool per model bundle. Workers transfer exclusively through the
//! pool: |idle| + |acquired| = capacity at all times observable under the
//! pool's lock.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use lattice_serve_config::ModelSpec;
use lattice_serve_core::engine::Engine;
use lattice_serve_core::ServeError;

use crate::bundle::ModelBundle;
use crate::worker::DecoderWorker;

/// Bounded blocking queue of idle decoder workers for one model.
pub struct DecoderPool {
    bundle: Arc<ModelBundle>,
    idle: Mutex<VecDeque<DecoderWorker>>,
    available: Condvar,
    capacity: usize,
}

impl std::fmt::Debug for DecoderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderPool")
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl DecoderPool {
    /// Load the model bundle and fill the pool with `n_decoders` workers.
    pub fn new(engine: &dyn Engine, spec: &ModelSpec) -> Result<Self, ServeError> {
        let bundle = Arc::new(ModelBundle::load(engine, spec)?);

        let capacity = spec.n_decoders.max(1);
        let mut idle = VecDeque::with_capacity(capacity);
        for _ in 0..capacity {
            idle.push_back(DecoderWorker::new(Arc::clone(&bundle)));
        }

        tracing::info!(model = %bundle.id(), n_decoders = capacity, "decoder pool ready");

        Ok(Self {
            bundle,
            idle: Mutex::new(idle),
            available: Condvar::new(),
            capacity,
        })
    }

    /// Take a worker out of the pool, blocking until one is available.
    ///
    /// The returned lease resets the worker to idle and releases it on
    /// drop, on every exit path.
    pub fn acquire(&self) -> WorkerLease<'_> {
        let mut idle = self.idle.lock();
        loop {
            if let Some(worker) = idle.pop_front() {
                return WorkerLease {
                    pool: self,
                    worker: Some(worker),
                };
            }
            // re-check on wake: wakeups may be spurious or raced
            self.available.wait(&mut idle);
        }
    }

    fn release(&self, worker: DecoderWorker) {
        let mut idle = self.idle.lock();
        debug_assert!(!worker.is_active(), "worker released while active");
        debug_assert!(idle.len() < self.capacity, "pool over capacity");
        idle.push_back(worker);
        drop(idle);
        self.available.notify_one();
    }

    pub fn bundle(&self) -> &Arc<ModelBundle> {
        &self.bundle
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Workers currently idle in the queue.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}

/// Scoped ownership of an acquired worker.
///
/// Dropping the lease runs `end()` on the worker and returns it to the
/// pool, so an acquired worker can never leak and the next acquirer
/// always sees an idle worker.
pub struct WorkerLease<'a> {
    pool: &'a DecoderPool,
    worker: Option<DecoderWorker>,
}

impl Deref for WorkerLease<'_> {
    type Target = DecoderWorker;

    fn deref(&self) -> &DecoderWorker {
        self.worker.as_ref().expect("lease already released")
    }
}

impl DerefMut for WorkerLease<'_> {
    fn deref_mut(&mut self) -> &mut DecoderWorker {
        self.worker.as_mut().expect("lease already released")
    }
}

impl Drop for WorkerLease<'_> {
    fn drop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.end();
            self.pool.release(worker);
        }
    }
}
