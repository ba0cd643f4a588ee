//! Pool error types

use thiserror::Error;

use crate::command::CommandError;
use crate::process::ProcessError;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Ratio must be a number between 0.01 and 1.0 (included), got {0}")]
    InvalidRatio(f64),

    #[error("Invalid context range: {0}")]
    InvalidRange(String),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Command(#[from] CommandError),
}
