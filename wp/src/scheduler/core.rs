//! Multiprocessing: the poll loop tying pools, workers and the work source together

use std::collections::VecDeque;
use std::sync::Arc;

use eyre::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::config::{SchedulerConfig, SharedFeed};
use super::path_watch::PathWatch;
use super::retry::Retry;
use super::source::WorkSource;
use super::SchedulerError;
use crate::command::ArgumentSet;
use crate::pool::{LaunchResult, Pool, PoolError};

/// One launched argument-set
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub pool: String,
    pub worker: String,
    pub arguments: ArgumentSet,
}

/// Result of assigning a list of argument-sets to one pool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    pub dispatched: Vec<Dispatch>,
    /// Sets handed to a worker, launched or found already running, in order
    pub consumed: Vec<ArgumentSet>,
    /// Sets never handed to a worker
    pub remaining: Vec<ArgumentSet>,
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub dispatched: Vec<Dispatch>,
    /// Argument-sets that reached the shared pool
    pub shared_feed: usize,
}

/// Why the loop ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    PathChanged,
    Shutdown,
}

/// The scheduler.
///
/// Every tick asks the work source for each non-shared pool, hands the
/// argument-sets to idle workers in order, then feeds the shared pool.
pub struct Multiprocessing {
    config: SchedulerConfig,
    source: Arc<dyn WorkSource>,
    pools: Vec<Pool>,
    shared: Option<Pool>,
    retry: Option<Retry>,
    path_watch: Option<PathWatch>,
}

impl Multiprocessing {
    pub fn new(config: SchedulerConfig, source: Arc<dyn WorkSource>) -> Result<Self, SchedulerError> {
        debug!(?config, "Multiprocessing::new: called");
        config.validate()?;
        Ok(Self {
            config,
            source,
            pools: Vec::new(),
            shared: None,
            retry: None,
            path_watch: None,
        })
    }

    /// Route tick errors through `retry` instead of ending the loop
    pub fn with_retry(mut self, retry: Retry) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_path_watch(mut self, path_watch: PathWatch) -> Self {
        self.path_watch = Some(path_watch);
        self
    }

    pub fn add_pool(&mut self, pool: Pool) -> Result<&mut Self, SchedulerError> {
        debug!(name = %pool.name(), shared = pool.is_shared(), workers = pool.len(), "Multiprocessing::add_pool: called");
        if !pool.is_shared() {
            self.pools.push(pool);
            return Ok(self);
        }

        if let Some(existing) = &self.shared {
            return Err(SchedulerError::DuplicateSharedPool {
                existing: existing.name().to_string(),
                pool: pool.name().to_string(),
            });
        }
        self.shared = Some(pool);
        Ok(self)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Non-shared pools then the shared pool, if any
    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        self.pools.iter().chain(self.shared.iter())
    }

    /// Run one scheduling pass
    pub async fn tick(&mut self) -> Result<TickReport> {
        debug!("Multiprocessing::tick: called");
        let mut report = TickReport::default();
        let mut feed: Vec<ArgumentSet> = Vec::new();

        for pool in &mut self.pools {
            let sets = self
                .source
                .produce(pool.context())
                .await
                .wrap_err_with(|| format!("Work source failed for pool '{}'", pool.name()))?;

            if sets.is_empty() {
                debug!(pool = %pool.name(), "Multiprocessing::tick: no work");
                continue;
            }

            let assignment = Self::check_workers_in_pool(pool, sets, self.config.safe)
                .await
                .wrap_err_with(|| format!("Assignment failed for pool '{}'", pool.name()))?;

            match self.config.shared_feed {
                SharedFeed::Consumed => feed.extend(assignment.consumed),
                SharedFeed::Leftover => feed.extend(assignment.remaining),
            }
            report.dispatched.extend(assignment.dispatched);
        }

        if let Some(shared) = &mut self.shared {
            if !feed.is_empty() {
                report.shared_feed = feed.len();
                debug!(pool = %shared.name(), count = feed.len(), "Multiprocessing::tick: feeding shared pool");
                let assignment = Self::check_workers_in_pool(shared, feed, self.config.safe)
                    .await
                    .wrap_err_with(|| format!("Assignment failed for shared pool '{}'", shared.name()))?;
                report.dispatched.extend(assignment.dispatched);
            }
        }

        Ok(report)
    }

    /// Hand argument-sets, front first, to the idle workers of `pool`.
    ///
    /// Idleness is checked lazily, worker by worker. A set found already
    /// running is dropped and the same worker takes the next one.
    pub async fn check_workers_in_pool(
        pool: &mut Pool,
        sets: Vec<ArgumentSet>,
        safe: bool,
    ) -> Result<Assignment, PoolError> {
        debug!(pool = %pool.name(), count = sets.len(), safe, "Multiprocessing::check_workers_in_pool: called");
        let pool_name = pool.name().to_string();
        let mut queue: VecDeque<ArgumentSet> = sets.into();
        let mut assignment = Assignment::default();

        for worker in pool.workers_mut() {
            if queue.is_empty() {
                break;
            }
            if !worker.is_idle(false, true).await? {
                continue;
            }

            while let Some(arguments) = queue.pop_front() {
                worker.reset().bind(arguments.clone());
                assignment.consumed.push(arguments.clone());

                match worker.run(true, safe).await? {
                    LaunchResult::Launched => {
                        assignment.dispatched.push(Dispatch {
                            pool: pool_name.clone(),
                            worker: worker.label(),
                            arguments,
                        });
                        break;
                    }
                    LaunchResult::AlreadyRunning => {
                        debug!(worker = %worker.label(), "Multiprocessing::check_workers_in_pool: already running, next set");
                    }
                }
            }
        }

        assignment.remaining = queue.into();
        Ok(assignment)
    }

    /// Run until the process is told to stop
    pub async fn run(&mut self) -> Result<StopReason> {
        let (_tx, rx) = mpsc::channel(1);
        self.run_until(rx).await
    }

    /// Poll loop; returns on shutdown message, path change, or an error past the retry budget
    pub async fn run_until(&mut self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<StopReason> {
        info!(
            pools = self.pools.len(),
            shared = self.shared.is_some(),
            delay_secs = self.config.delay_secs,
            "Scheduler loop starting"
        );

        loop {
            if let Some(watch) = &self.path_watch {
                if watch.has_changed() {
                    warn!(path = ?watch.path(), "Source path changed, stopping scheduler");
                    return Ok(StopReason::PathChanged);
                }
            }

            match self.tick().await {
                Ok(report) => {
                    if !report.dispatched.is_empty() {
                        info!(dispatched = report.dispatched.len(), shared_feed = report.shared_feed, "Tick complete");
                    }
                }
                Err(e) => {
                    let Some(retry) = &mut self.retry else {
                        return Err(e);
                    };
                    warn!(error = %e, "Tick failed");
                    retry.retry(e)?;
                    continue;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.delay()) => {}
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested, stopping scheduler");
                    return Ok(StopReason::Shutdown);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::command::{Argument, Command};
    use crate::pool::{CallbackContext, PoolConfig, WorkerSpec, build_pool};
    use crate::scheduler::source::from_fn;
    use crate::testing::FakeProcessTable;

    fn spec(table: &Arc<FakeProcessTable>) -> WorkerSpec {
        let template = Command::console("/app/bin/console")
            .unwrap()
            .with_argument(Argument::long("name", "Worker/Resize"));
        WorkerSpec::new(template, "pool-index", table.clone(), table.clone())
    }

    fn pool(table: &Arc<FakeProcessTable>, name: &str, ratio: f64, shared: bool, max: usize) -> Pool {
        let config = PoolConfig::new(ratio, shared, None).unwrap();
        build_pool(name, &config, max, &spec(table), CallbackContext::new(name, max)).unwrap()
    }

    fn id(value: &str) -> ArgumentSet {
        vec![Argument::long("id", value)]
    }

    fn ids(report: &TickReport) -> Vec<(String, String)> {
        report
            .dispatched
            .iter()
            .map(|d| (d.worker.clone(), d.arguments[0].text().unwrap_or_default().to_string()))
            .collect()
    }

    fn config(max: usize) -> SchedulerConfig {
        SchedulerConfig {
            max_processes: max,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_two_tick_dispatch() {
        let table = Arc::new(FakeProcessTable::new());
        let source = Arc::new(from_fn(|_: &CallbackContext| Ok(vec![id("A"), id("B")])));
        let mut mp = Multiprocessing::new(config(2), source).unwrap();
        mp.add_pool(pool(&table, "basic", 1.0, false, 2)).unwrap();

        let report = mp.tick().await.unwrap();
        assert_eq!(
            ids(&report),
            vec![
                ("basic.0".to_string(), "A".to_string()),
                ("basic.1".to_string(), "B".to_string()),
            ]
        );
        assert_eq!(
            table.launched()[0],
            "/app/bin/console --pool-index=basic.0 --name=Worker/Resize --id=A > /dev/null 2>&1 &"
        );

        let report = mp.tick().await.unwrap();
        assert!(report.dispatched.is_empty());
        assert_eq!(table.launched().len(), 2);
    }

    #[tokio::test]
    async fn test_already_running_set_is_absorbed_by_same_worker() {
        let table = Arc::new(FakeProcessTable::new());
        table.spawn_line("/app/bin/console --pool-index=other.0 --name=Worker/Resize --id=A");

        let mut basic = pool(&table, "basic", 1.0, false, 2);
        let assignment = Multiprocessing::check_workers_in_pool(&mut basic, vec![id("A"), id("B"), id("C")], true)
            .await
            .unwrap();

        let placed: Vec<(&str, &str)> = assignment
            .dispatched
            .iter()
            .map(|d| (d.worker.as_str(), d.arguments[0].text().unwrap_or_default()))
            .collect();
        assert_eq!(placed, vec![("basic.0", "B"), ("basic.1", "C")]);
        assert_eq!(assignment.consumed, vec![id("A"), id("B"), id("C")]);
        assert!(assignment.remaining.is_empty());
    }

    #[tokio::test]
    async fn test_unsafe_mode_relaunches_running_set() {
        let table = Arc::new(FakeProcessTable::new());
        table.spawn_line("/app/bin/console --pool-index=other.0 --name=Worker/Resize --id=A");

        let mut basic = pool(&table, "basic", 0.5, false, 2);
        let assignment = Multiprocessing::check_workers_in_pool(&mut basic, vec![id("A"), id("B")], false)
            .await
            .unwrap();

        assert_eq!(assignment.dispatched.len(), 1);
        assert_eq!(assignment.dispatched[0].arguments, id("A"));
        assert_eq!(assignment.remaining, vec![id("B")]);
    }

    #[tokio::test]
    async fn test_busy_workers_are_skipped() {
        let table = Arc::new(FakeProcessTable::new());
        table.spawn_line("/app/bin/console --pool-index=basic.0 --name=Worker/Resize --id=Z");

        let mut basic = pool(&table, "basic", 1.0, false, 2);
        let assignment = Multiprocessing::check_workers_in_pool(&mut basic, vec![id("A"), id("B")], true)
            .await
            .unwrap();

        assert_eq!(assignment.dispatched.len(), 1);
        assert_eq!(assignment.dispatched[0].worker, "basic.1");
        assert_eq!(assignment.remaining, vec![id("B")]);
    }

    #[tokio::test]
    async fn test_shared_pool_receives_consumed_sets() {
        let table = Arc::new(FakeProcessTable::new());
        let source = Arc::new(from_fn(|_: &CallbackContext| Ok(vec![id("A"), id("B"), id("C")])));
        let mut mp = Multiprocessing::new(config(2), source).unwrap();
        mp.add_pool(pool(&table, "basic", 0.5, false, 2)).unwrap();
        mp.add_pool(pool(&table, "shared", 1.0, true, 2)).unwrap();

        let report = mp.tick().await.unwrap();

        // basic.0 takes A; the shared pool is fed A again and finds it running
        assert_eq!(report.shared_feed, 1);
        assert_eq!(ids(&report), vec![("basic.0".to_string(), "A".to_string())]);
        assert_eq!(table.launched().len(), 1);
    }

    #[tokio::test]
    async fn test_shared_pool_receives_leftovers() {
        let table = Arc::new(FakeProcessTable::new());
        let source = Arc::new(from_fn(|_: &CallbackContext| Ok(vec![id("A"), id("B"), id("C")])));
        let mut mp = Multiprocessing::new(
            SchedulerConfig {
                shared_feed: SharedFeed::Leftover,
                ..config(2)
            },
            source,
        )
        .unwrap();
        mp.add_pool(pool(&table, "basic", 0.5, false, 2)).unwrap();
        mp.add_pool(pool(&table, "shared", 1.0, true, 2)).unwrap();

        let report = mp.tick().await.unwrap();
        assert_eq!(report.shared_feed, 2);
        assert_eq!(
            ids(&report),
            vec![
                ("basic.0".to_string(), "A".to_string()),
                ("shared.0".to_string(), "B".to_string()),
                ("shared.1".to_string(), "C".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_second_shared_pool_is_rejected() {
        let table = Arc::new(FakeProcessTable::new());
        let source = Arc::new(from_fn(|_: &CallbackContext| Ok(Vec::new())));
        let mut mp = Multiprocessing::new(config(2), source).unwrap();
        mp.add_pool(pool(&table, "s1", 0.5, true, 2)).unwrap();

        let err = mp.add_pool(pool(&table, "s2", 0.5, true, 2)).err().unwrap();
        assert!(matches!(err, SchedulerError::DuplicateSharedPool { .. }));
    }

    #[tokio::test]
    async fn test_zero_delay_rejected_at_construction() {
        let source = Arc::new(from_fn(|_: &CallbackContext| Ok(Vec::new())));
        let config = SchedulerConfig {
            delay_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            Multiprocessing::new(config, source),
            Err(SchedulerError::InvalidDelay(0))
        ));
    }

    #[tokio::test]
    async fn test_source_sees_each_pool_context() {
        let table = Arc::new(FakeProcessTable::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_source = seen.clone();
        let source = Arc::new(from_fn(move |ctx: &CallbackContext| {
            seen_by_source.lock().unwrap().push(ctx.pool.clone());
            Ok(Vec::new())
        }));

        let mut mp = Multiprocessing::new(config(4), source).unwrap();
        mp.add_pool(pool(&table, "premium", 0.5, false, 4)).unwrap();
        mp.add_pool(pool(&table, "shared", 0.5, true, 4)).unwrap();
        mp.add_pool(pool(&table, "basic", 0.5, false, 4)).unwrap();

        let report = mp.tick().await.unwrap();
        assert!(report.dispatched.is_empty());
        assert_eq!(report.shared_feed, 0);
        assert_eq!(*seen.lock().unwrap(), vec!["premium".to_string(), "basic".to_string()]);
    }

    #[tokio::test]
    async fn test_error_without_retry_ends_loop() {
        let table = Arc::new(FakeProcessTable::new());
        table.fail_next_finds(1);
        let source = Arc::new(from_fn(|_: &CallbackContext| Ok(vec![id("A")])));
        let mut mp = Multiprocessing::new(config(1), source).unwrap();
        mp.add_pool(pool(&table, "basic", 1.0, false, 1)).unwrap();

        assert!(mp.run().await.is_err());
        assert!(table.launched().is_empty());
    }

    #[tokio::test]
    async fn test_retry_absorbs_error_then_shutdown() {
        let table = Arc::new(FakeProcessTable::new());
        table.fail_next_finds(2);
        let source = Arc::new(from_fn(|_: &CallbackContext| Ok(vec![id("A")])));
        let mut mp = Multiprocessing::new(config(1), source)
            .unwrap()
            .with_retry(Retry::new(5, 30));
        mp.add_pool(pool(&table, "basic", 1.0, false, 1)).unwrap();

        let (tx, rx) = mpsc::channel(1);
        tx.send(()).await.unwrap();

        let reason = tokio::time::timeout(Duration::from_secs(5), mp.run_until(rx))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, StopReason::Shutdown);
        assert_eq!(table.launched().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted_returns_error() {
        let table = Arc::new(FakeProcessTable::new());
        table.fail_next_finds(10);
        let source = Arc::new(from_fn(|_: &CallbackContext| Ok(vec![id("A")])));
        let mut mp = Multiprocessing::new(config(1), source)
            .unwrap()
            .with_retry(Retry::new(2, 30));
        mp.add_pool(pool(&table, "basic", 1.0, false, 1)).unwrap();

        let (_tx, rx) = mpsc::channel(1);
        let result = tokio::time::timeout(Duration::from_secs(5), mp.run_until(rx)).await.unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_path_change_stops_loop() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("release");
        std::fs::create_dir(&dir).unwrap();
        let watch = PathWatch::new(&dir).unwrap();
        std::fs::remove_dir(&dir).unwrap();

        let source = Arc::new(from_fn(|_: &CallbackContext| Ok(Vec::new())));
        let mut mp = Multiprocessing::new(config(1), source).unwrap().with_path_watch(watch);

        let (_tx, rx) = mpsc::channel(1);
        assert_eq!(mp.run_until(rx).await.unwrap(), StopReason::PathChanged);
    }
}
