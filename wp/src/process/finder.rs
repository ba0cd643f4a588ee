//! ProcessFinder trait and the pgrep-backed implementation

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ProcessCollection, ProcessError};
use crate::command::{Argument, Command, CommandError};

/// Query the process table for command lines matching a pattern
///
/// Nothing matching is success with an empty collection.
#[async_trait]
pub trait ProcessFinder: Send + Sync {
    async fn find(&self, pattern: &str) -> Result<ProcessCollection, ProcessError>;
}

/// Discovery through `pgrep -a -f PATTERN`
#[derive(Debug, Clone)]
pub struct PgrepFinder {
    program: String,
}

impl Default for PgrepFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl PgrepFinder {
    pub fn new() -> Self {
        Self::with_program("pgrep")
    }

    /// Use another pgrep-compatible executable
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    /// The listing command for a pattern
    pub fn command(&self, pattern: &str) -> Command {
        Command::pgrep(self.program.as_str())
            .with_argument(Argument::short_flag("a"))
            .with_argument(Argument::short("f", pattern))
    }
}

#[async_trait]
impl ProcessFinder for PgrepFinder {
    async fn find(&self, pattern: &str) -> Result<ProcessCollection, ProcessError> {
        debug!(%pattern, "PgrepFinder::find: called");
        let command = self.command(pattern);
        let output = command.exec_output().await?;

        // pgrep: 0 matched, 1 nothing matched, 2 syntax error, 3 fatal; 126/127 from sh
        match output.status.code() {
            Some(0) | Some(1) => Ok(ProcessCollection::from_listing(
                String::from_utf8_lossy(&output.stdout).lines(),
            )),
            _ => {
                warn!(status = ?output.status, "PgrepFinder::find: listing failed");
                Err(CommandError::exit(command.build(false), output.status, &output.stderr).into())
            }
        }
    }
}
