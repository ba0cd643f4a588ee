//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::SchedulerError;

/// What the shared pool is fed with after the non-shared pools ran
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SharedFeed {
    /// Every argument-set handed to a non-shared worker this tick
    #[default]
    Consumed,
    /// Argument-sets the non-shared pools could not place
    Leftover,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sleep between two ticks, in seconds
    #[serde(rename = "delay-secs")]
    pub delay_secs: u64,

    /// Skip a launch when the same arguments already run somewhere
    pub safe: bool,

    /// Stop when the resolved invocation directory changes
    #[serde(rename = "detect-path-changes")]
    pub detect_path_changes: bool,

    #[serde(rename = "shared-feed")]
    pub shared_feed: SharedFeed,

    /// Nominal process count the pool ratios apply to
    #[serde(rename = "max-processes")]
    pub max_processes: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            delay_secs: 1,
            safe: true,
            detect_path_changes: false,
            shared_feed: SharedFeed::Consumed,
            max_processes: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.delay_secs == 0 {
            return Err(SchedulerError::InvalidDelay(self.delay_secs));
        }
        if self.max_processes == 0 {
            return Err(SchedulerError::InvalidMaxProcesses);
        }
        Ok(())
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}
