//! Dispatcher: model id to decoder pool registry
//!
//! Built once at startup; the mapping is read-only afterwards, so lookups
//! need no synchronization.

use std::collections::HashMap;

use lattice_serve_config::ModelSpec;
use lattice_serve_core::engine::Engine;
use lattice_serve_core::{ModelId, Result, ServeError};

use crate::pool::DecoderPool;
use crate::worker::DecoderWorker;

/// Maps incoming requests to the decoder pool of their model.
pub struct Dispatcher {
    pools: HashMap<ModelId, DecoderPool>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pools", &self.pools)
            .finish()
    }
}

impl Dispatcher {
    /// Build one pool per spec. Duplicate model ids are a configuration
    /// error and rejected at startup.
    pub fn new(engine: &dyn Engine, specs: &[ModelSpec]) -> Result<Self> {
        let mut pools = HashMap::with_capacity(specs.len());
        for spec in specs {
            let id = spec.model_id();
            if pools.contains_key(&id) {
                return Err(ServeError::DuplicateModel(id));
            }
            pools.insert(id, DecoderPool::new(engine, spec)?);
        }
        Ok(Self { pools })
    }

    pub fn has_model(&self, id: &ModelId) -> bool {
        self.pools.contains_key(id)
    }

    /// The pool serving `id`, or `ModelNotFound`.
    pub fn pool(&self, id: &ModelId) -> Result<&DecoderPool> {
        self.pools
            .get(id)
            .ok_or_else(|| ServeError::ModelNotFound(id.clone()))
    }

    /// Acquire a worker of `id`, run `f` on it, and release it. Release
    /// is guaranteed on all exit paths including failures.
    pub fn with_worker<T>(
        &self,
        id: &ModelId,
        f: impl FnOnce(&mut DecoderWorker) -> Result<T>,
    ) -> Result<T> {
        let pool = self.pool(id)?;
        let mut lease = pool.acquire();
        f(&mut lease)
    }

    pub fn model_ids(&self) -> impl Iterator<Item = &ModelId> {
        self.pools.keys()
    }

    pub fn model_count(&self) -> usize {
        self.pools.len()
    }
}
