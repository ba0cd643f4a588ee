//! workpool - single-host worker-pool scheduler
//!
//! A long-running daemon that keeps a fleet of external OS processes busy.
//! Each tick it asks a work source for argument-sets, finds idle worker slots
//! by querying the OS process table, and launches the worker command with the
//! arguments bound. Job identity lives on the command line: "is this unit of
//! work still running" is answered by matching a pattern against running
//! processes.
//!
//! # Modules
//!
//! - [`command`] - Command/argument model, rendering, patterns and parsing
//! - [`process`] - Process discovery (`pgrep`, `/proc`) and launching
//! - [`pool`] - Pools, workers and per-pool callback context
//! - [`scheduler`] - Poll loop, retry budget, work sources, path watch
//! - [`config`] - Configuration types and loading
//! - [`daemon`] - Scheduler assembly from configuration
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod command;
pub mod config;
pub mod daemon;
pub mod pool;
pub mod process;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use command::{Argument, ArgumentSet, ArgumentValue, Command, CommandError, CommandKind};
pub use config::Config;
pub use pool::{CallbackContext, ContextRange, LaunchResult, Pool, PoolConfig, PoolError, Worker};
pub use process::{Launcher, PgrepFinder, ProcFsFinder, Process, ProcessCollection, ProcessError, ProcessFinder};
pub use scheduler::{Multiprocessing, Retry, SchedulerConfig, SchedulerError, TickReport, WorkSource};
