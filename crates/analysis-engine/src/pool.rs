//! Pool of long-lived engine processes lent out one at a time

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::{Notify, Semaphore, SemaphorePermit};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::PoolError;
use crate::evaluator::{self, EvalOutcome, EvalParams};
use crate::stockfish::{StockfishEngine, UciEngine};

pub struct EnginePool<E: UciEngine = StockfishEngine> {
    /// Idle handles; the semaphore holds one permit per entry
    idle: Mutex<Vec<E>>,
    permits: Semaphore,
    returned: Notify,
    size: usize,
    lent: AtomicUsize,
    shut_down: AtomicBool,
    params: EvalParams,
}

impl EnginePool<StockfishEngine> {
    /// Spawn up to `config.pool_size` Stockfish processes. Processes that fail
    /// to start are skipped, so the pool may be smaller than asked, even empty.
    pub async fn start(config: &EngineConfig) -> Self {
        let params = EvalParams::from(config);

        let Some(path) = config.stockfish_path.as_deref() else {
            warn!("Stockfish not found; engine pool is empty");
            return Self::from_parts(Vec::new(), params);
        };

        info!(pool_size = config.pool_size, path, "Creating Stockfish engine pool");
        let mut engines = Vec::with_capacity(config.pool_size);
        for engine_id in 0..config.pool_size {
            match StockfishEngine::new(path, config.hash_mb).await {
                Ok(engine) => {
                    info!(engine_id, "Stockfish engine ready");
                    engines.push(engine);
                }
                Err(e) => warn!(engine_id, error = %e, "Failed to start Stockfish engine"),
            }
        }
        info!(engines = engines.len(), "Stockfish pool ready");

        Self::from_parts(engines, params)
    }
}

impl<E: UciEngine> EnginePool<E> {
    /// Build a pool around existing handles.
    pub fn from_engines(engines: Vec<E>, depth: u32, multi_pv: u32) -> Self {
        Self::from_parts(engines, EvalParams::new(depth, multi_pv))
    }

    fn from_parts(engines: Vec<E>, params: EvalParams) -> Self {
        let size = engines.len();
        Self {
            idle: Mutex::new(engines),
            permits: Semaphore::new(size),
            returned: Notify::new(),
            size,
            lent: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
            params,
        }
    }

    pub fn params(&self) -> EvalParams {
        self.params
    }

    /// At least one engine process is running.
    pub fn is_available(&self) -> bool {
        self.size > 0 && !self.shut_down.load(Ordering::SeqCst)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Handles currently lent out.
    pub fn in_use(&self) -> usize {
        self.lent.load(Ordering::SeqCst)
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<E>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait for a free handle.
    pub async fn acquire(&self) -> Result<PooledEngine<'_, E>, PoolError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(PoolError::ShutDown);
        }
        if self.size == 0 {
            return Err(PoolError::Unavailable);
        }

        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PoolError::ShutDown)?;

        let engine = self.lock_idle().pop().ok_or(PoolError::Unavailable)?;
        self.lent.fetch_add(1, Ordering::SeqCst);

        Ok(PooledEngine {
            pool: self,
            engine: Some(engine),
            _permit: permit,
        })
    }

    /// Hand a handle back. Dropping the guard does the same.
    pub fn release(&self, guard: PooledEngine<'_, E>) {
        drop(guard);
    }

    fn give_back(&self, engine: E) {
        self.lock_idle().push(engine);
        self.lent.fetch_sub(1, Ordering::SeqCst);
        self.returned.notify_one();
    }

    /// Evaluate one position on the next free handle, or with the material
    /// heuristic when no handle can be had.
    pub async fn evaluate(&self, fen: &str) -> EvalOutcome {
        match self.acquire().await {
            Ok(mut guard) => evaluator::evaluate(Some(&mut *guard), fen, self.params).await,
            Err(_) => evaluator::evaluate::<E>(None, fen, self.params).await,
        }
    }

    /// Stop lending, wait for outstanding handles, then quit every process.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.permits.close();

        loop {
            let returned = self.returned.notified();
            if self.in_use() == 0 {
                break;
            }
            returned.await;
        }

        let engines = std::mem::take(&mut *self.lock_idle());
        info!(engines = engines.len(), "Shutting down Stockfish engines");
        for mut engine in engines {
            engine.quit().await;
        }
    }
}

/// An engine borrowed from the pool; returned when dropped.
pub struct PooledEngine<'a, E: UciEngine> {
    pool: &'a EnginePool<E>,
    engine: Option<E>,
    _permit: SemaphorePermit<'a>,
}

impl<E: UciEngine> Deref for PooledEngine<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        self.engine.as_ref().expect("engine present until drop")
    }
}

impl<E: UciEngine> DerefMut for PooledEngine<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        self.engine.as_mut().expect("engine present until drop")
    }
}

impl<E: UciEngine> Drop for PooledEngine<'_, E> {
    fn drop(&mut self) {
        // Engine goes back before the permit is released
        if let Some(engine) = self.engine.take() {
            self.pool.give_back(engine);
        }
    }
}
