//! Launcher trait: how the scheduler starts a worker command

use async_trait::async_trait;
use tracing::{debug, info};

use crate::command::{Command, CommandError};

#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, command: &Command, is_async: bool) -> Result<(), CommandError>;
}

/// Launch through `sh -c`
#[derive(Debug, Clone, Default)]
pub struct ShellLauncher;

impl ShellLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Launcher for ShellLauncher {
    async fn launch(&self, command: &Command, is_async: bool) -> Result<(), CommandError> {
        debug!(is_async, "ShellLauncher::launch: called");
        command.exec(is_async, false).await?;
        info!(line = %command.build(is_async), "Launched worker command");
        Ok(())
    }
}
