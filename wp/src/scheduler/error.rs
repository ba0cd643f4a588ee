//! Scheduler construction errors

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Delay must be at least 1 second, got {0}")]
    InvalidDelay(u64),

    #[error("max-processes must be greater than 0")]
    InvalidMaxProcesses,

    #[error("Only one shared pool is allowed ('{existing}' already registered, got '{pool}')")]
    DuplicateSharedPool { existing: String, pool: String },

    #[error("Cannot resolve watched path {path}")]
    PathResolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
