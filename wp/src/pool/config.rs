//! Pool sizing and construction

use std::sync::Arc;

use tracing::debug;

use super::{CallbackContext, Pool, PoolError, Worker};
use crate::command::{Argument, Command};
use crate::process::{Launcher, ProcessFinder};

pub const MIN_RATIO: f64 = 0.01;
pub const MAX_RATIO: f64 = 1.0;

const PRODUCT_TOLERANCE: f64 = 1e-9;

pub(crate) fn validate_ratio(ratio: f64) -> Result<f64, PoolError> {
    if (MIN_RATIO..=MAX_RATIO).contains(&ratio) {
        Ok(ratio)
    } else {
        Err(PoolError::InvalidRatio(ratio))
    }
}

/// Validated sizing of one pool
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    ratio: f64,
    is_shared: bool,
    index: Option<String>,
}

impl PoolConfig {
    pub fn new(ratio: f64, is_shared: bool, index: Option<String>) -> Result<Self, PoolError> {
        Ok(Self {
            ratio: validate_ratio(ratio)?,
            is_shared,
            index,
        })
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn is_shared(&self) -> bool {
        self.is_shared
    }

    /// Prefix of the type argument values, the pool name when unset
    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    /// `ceil(max_processes * ratio)`, with products within float noise of an integer snapped to it
    pub fn worker_count(&self, max_processes: usize) -> usize {
        let product = max_processes as f64 * self.ratio;
        let nearest = product.round();

        if (product - nearest).abs() < PRODUCT_TOLERANCE {
            nearest as usize
        } else {
            product.ceil() as usize
        }
    }
}

/// Everything needed to stamp out workers for a pool
#[derive(Clone)]
pub struct WorkerSpec {
    pub template: Command,
    /// Name of the argument that tells slots apart, e.g. `pool-index`
    pub type_argument: String,
    pub finder: Arc<dyn ProcessFinder>,
    pub launcher: Arc<dyn Launcher>,
}

impl WorkerSpec {
    pub fn new(
        template: Command,
        type_argument: impl Into<String>,
        finder: Arc<dyn ProcessFinder>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Self {
            template,
            type_argument: type_argument.into(),
            finder,
            launcher,
        }
    }
}

/// Build a pool of `worker_count` slots labelled `{index}.{i}`
pub fn build_pool(
    name: &str,
    config: &PoolConfig,
    max_processes: usize,
    spec: &WorkerSpec,
    context: CallbackContext,
) -> Result<Pool, PoolError> {
    let count = config.worker_count(max_processes);
    debug!(%name, count, "build_pool: called");

    let index = config.index().unwrap_or(name);
    let mut pool = Pool::new(name, config.ratio(), config.is_shared())?.with_context(context);

    for i in 0..count {
        let template = spec
            .template
            .clone()
            .with_type(Argument::long(spec.type_argument.as_str(), format!("{}.{}", index, i)));
        pool.attach_worker(Worker::new(template, spec.finder.clone(), spec.launcher.clone()));
    }

    Ok(pool)
}
