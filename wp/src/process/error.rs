//! Process discovery error types

use std::path::PathBuf;

use thiserror::Error;

use crate::command::CommandError;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Process discovery failed: {0}")]
    Discovery(#[from] CommandError),

    #[error("Invalid process pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to scan processes under {root}")]
    Scan {
        root: PathBuf,
        #[source]
        source: procfs::ProcError,
    },

    #[error("Process scan task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
