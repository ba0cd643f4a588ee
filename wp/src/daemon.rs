//! Assemble a scheduler from configuration

use std::sync::Arc;

use eyre::{Context, Result, eyre};
use tracing::{debug, info};

use crate::config::{Config, FinderKind, SourceConfig};
use crate::pool::{WorkerSpec, build_pool};
use crate::process::{Launcher, PgrepFinder, ProcFsFinder, ProcessFinder};
use crate::scheduler::{CommandSource, Multiprocessing, PathWatch, WorkSource};

pub fn build_finder(kind: FinderKind) -> Arc<dyn ProcessFinder> {
    debug!(?kind, "build_finder: called");
    match kind {
        FinderKind::Pgrep => Arc::new(PgrepFinder::new()),
        FinderKind::Procfs => Arc::new(ProcFsFinder::default()),
    }
}

pub fn build_source(config: &SourceConfig) -> Result<Arc<dyn WorkSource>> {
    let line = config
        .command
        .as_deref()
        .ok_or_else(|| eyre!("No work source configured (source.command)"))?;
    Ok(Arc::new(CommandSource::new(line)))
}

/// Build pools and the scheduler; configuration errors surface here, before any spawn
pub fn build_scheduler(
    config: &Config,
    finder: Arc<dyn ProcessFinder>,
    launcher: Arc<dyn Launcher>,
    source: Arc<dyn WorkSource>,
    path_watch: Option<PathWatch>,
) -> Result<Multiprocessing> {
    debug!(pools = config.pools.len(), "build_scheduler: called");
    config.validate()?;

    let template = config.worker.template().context("Invalid worker command")?;
    let spec = WorkerSpec::new(template, config.worker.type_argument.as_str(), finder, launcher);
    let max_processes = config.scheduler.max_processes;

    let mut scheduler = Multiprocessing::new(config.scheduler.clone(), source)?;
    if let Some(retry) = config.retry() {
        scheduler = scheduler.with_retry(retry);
    }
    if let Some(watch) = path_watch {
        info!(path = ?watch.path(), real_path = ?watch.real_path(), "Watching source path");
        scheduler = scheduler.with_path_watch(watch);
    }

    for entry in &config.pools {
        let pool = build_pool(
            &entry.name,
            &entry.pool_config()?,
            max_processes,
            &spec,
            entry.callback_context(max_processes)?,
        )?;
        info!(pool = %entry.name, workers = pool.len(), shared = pool.is_shared(), "Pool ready");
        scheduler.add_pool(pool)?;
    }

    Ok(scheduler)
}
