//! Work sources: where argument-sets come from

use async_trait::async_trait;
use eyre::{Context, Result};
use tracing::debug;

use crate::command::{ArgumentSet, Command, parse_argument_line};
use crate::pool::CallbackContext;

/// Environment variable holding the asking pool's name
pub const POOL_ENV: &str = "WP_POOL";
/// Environment variable holding the JSON-encoded [`CallbackContext`]
pub const CONTEXT_ENV: &str = "WP_CONTEXT";

/// Produce pending work for a pool, in dispatch order
#[async_trait]
pub trait WorkSource: Send + Sync {
    async fn produce(&self, context: &CallbackContext) -> Result<Vec<ArgumentSet>>;
}

/// Source backed by a closure
pub struct FnSource<F> {
    f: F,
}

pub fn from_fn<F>(f: F) -> FnSource<F>
where
    F: Fn(&CallbackContext) -> Result<Vec<ArgumentSet>> + Send + Sync,
{
    FnSource { f }
}

#[async_trait]
impl<F> WorkSource for FnSource<F>
where
    F: Fn(&CallbackContext) -> Result<Vec<ArgumentSet>> + Send + Sync,
{
    async fn produce(&self, context: &CallbackContext) -> Result<Vec<ArgumentSet>> {
        (self.f)(context)
    }
}

/// Source running a feeder command; each stdout line is one argument-set.
///
/// The feeder is an unsafe generic command with the context exported as
/// `WP_POOL` and `WP_CONTEXT`. A non-zero exit fails the tick.
#[derive(Debug, Clone)]
pub struct CommandSource {
    command: Command,
}

impl CommandSource {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            command: Command::generic_unsafe(line),
        }
    }

    pub fn line(&self) -> &str {
        self.command.name()
    }
}

#[async_trait]
impl WorkSource for CommandSource {
    async fn produce(&self, context: &CallbackContext) -> Result<Vec<ArgumentSet>> {
        debug!(line = %self.line(), pool = %context.pool, "CommandSource::produce: called");
        let encoded = serde_json::to_string(context).context("Failed to encode callback context")?;

        let lines = self
            .command
            .clone()
            .with_env(POOL_ENV, context.pool.as_str())
            .with_env(CONTEXT_ENV, encoded)
            .exec(false, false)
            .await?;

        let sets: Vec<ArgumentSet> = lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .map(parse_argument_line)
            .collect();
        debug!(count = sets.len(), "CommandSource::produce: parsed argument-sets");
        Ok(sets)
    }
}
