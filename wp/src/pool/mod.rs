//! Pools of workers
//!
//! A [`Pool`] is a named, ratio-sized group of [`Worker`] slots. Sizing and
//! construction live in [`config`], the per-pool payload given to the work
//! source in [`context`].

mod config;
mod context;
mod error;
mod worker;

pub use config::{MAX_RATIO, MIN_RATIO, PoolConfig, WorkerSpec, build_pool};
pub use context::{CallbackContext, ContextRange};
pub use error::PoolError;
pub use worker::{LaunchResult, Worker};

use tracing::debug;

#[derive(Debug)]
pub struct Pool {
    name: String,
    ratio: f64,
    is_shared: bool,
    workers: Vec<Worker>,
    context: CallbackContext,
}

impl Pool {
    pub fn new(name: impl Into<String>, ratio: f64, is_shared: bool) -> Result<Self, PoolError> {
        let name = name.into();
        debug!(%name, ratio, is_shared, "Pool::new: called");
        Ok(Self {
            context: CallbackContext::new(name.clone(), 0),
            name,
            ratio: config::validate_ratio(ratio)?,
            is_shared,
            workers: Vec::new(),
        })
    }

    pub fn with_context(mut self, context: CallbackContext) -> Self {
        self.context = context;
        self
    }

    pub fn attach_worker(&mut self, worker: Worker) -> &mut Self {
        self.workers.push(worker);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn is_shared(&self) -> bool {
        self.is_shared
    }

    pub fn context(&self) -> &CallbackContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut CallbackContext {
        &mut self.context
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn workers_mut(&mut self) -> &mut [Worker] {
        &mut self.workers
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Query every worker; nothing is cached between calls
    pub async fn has_idle_worker(&self) -> Result<bool, PoolError> {
        debug!(name = %self.name, "Pool::has_idle_worker: called");
        for worker in &self.workers {
            if worker.is_idle(false, true).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
