//! Worker: one scheduling slot of a pool

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use super::PoolError;
use crate::command::{Argument, Command};
use crate::process::{Launcher, ProcessFinder};

/// Outcome of [`Worker::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchResult {
    /// The live command was handed to the launcher
    Launched,
    /// Safe mode found the same unit of work already running; nothing launched
    AlreadyRunning,
}

/// A slot that runs at most one command at a time.
///
/// The worker never caches whether it is busy: every idle check asks the
/// process finder. Between two polls the slot is either idle or has a
/// dispatched process the OS still reports.
pub struct Worker {
    template: Command,
    live: Command,
    finder: Arc<dyn ProcessFinder>,
    launcher: Arc<dyn Launcher>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("template", &self.template)
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}

impl Worker {
    pub fn new(template: Command, finder: Arc<dyn ProcessFinder>, launcher: Arc<dyn Launcher>) -> Self {
        debug!(line = %template.build(false), "Worker::new: called");
        Self {
            live: template.clone(),
            template,
            finder,
            launcher,
        }
    }

    pub fn template(&self) -> &Command {
        &self.template
    }

    pub fn command(&self) -> &Command {
        &self.live
    }

    /// Slot label, the type argument value when set
    pub fn label(&self) -> String {
        self.template
            .type_argument()
            .and_then(Argument::text)
            .map(str::to_string)
            .unwrap_or_else(|| self.template.name().to_string())
    }

    pub async fn is_idle(&self, check_arguments: bool, with_type: bool) -> Result<bool, PoolError> {
        Ok(!self.is_already_running(check_arguments, with_type).await?)
    }

    /// Ask the finder whether a process matching the live command exists
    pub async fn is_already_running(&self, check_arguments: bool, with_type: bool) -> Result<bool, PoolError> {
        let pattern = self.live.pattern(check_arguments, with_type);
        debug!(%pattern, "Worker::is_already_running: called");
        let found = self.finder.find(&pattern).await?;
        Ok(!found.is_empty())
    }

    /// Replace the live command with a fresh copy of the template
    pub fn reset(&mut self) -> &mut Self {
        self.live = self.template.clone();
        self
    }

    /// Append a unit of work to the live command
    pub fn bind(&mut self, arguments: impl IntoIterator<Item = Argument>) -> &mut Self {
        self.live.add_arguments(arguments);
        self
    }

    /// Launch the live command.
    ///
    /// In safe mode the launch is skipped when the same arguments already run
    /// in any slot. The check and the launch are not atomic: a process started
    /// elsewhere in between is not detected.
    pub async fn run(&self, is_async: bool, safe: bool) -> Result<LaunchResult, PoolError> {
        debug!(label = %self.label(), is_async, safe, "Worker::run: called");

        if safe && self.is_already_running(true, false).await? {
            debug!(label = %self.label(), "Worker::run: already running");
            return Ok(LaunchResult::AlreadyRunning);
        }

        self.launcher.launch(&self.live, is_async).await?;
        info!(label = %self.label(), line = %self.live.build(is_async), "Worker dispatched");
        Ok(LaunchResult::Launched)
    }
}
