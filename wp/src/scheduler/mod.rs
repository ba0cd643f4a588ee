//! Scheduler
//!
//! [`Multiprocessing`] owns the pools and the work source and runs the poll
//! loop, with an optional [`Retry`] budget and [`PathWatch`] redeploy check.

mod config;
mod core;
mod error;
mod path_watch;
mod retry;
mod source;

pub use config::{SchedulerConfig, SharedFeed};
pub use self::core::{Assignment, Dispatch, Multiprocessing, StopReason, TickReport};
pub use error::SchedulerError;
pub use path_watch::PathWatch;
pub use retry::{DEFAULT_MAX_RETRY, DEFAULT_TIME_BEFORE_RETRY_SECS, Retry};
pub use source::{CONTEXT_ENV, CommandSource, FnSource, POOL_ENV, WorkSource, from_fn};
