//! Per-pool payload handed to the work source

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PoolError;

/// What a work source knows about the pool asking for work
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallbackContext {
    pub pool: String,
    pub max_processes: usize,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ContextRange>,
}

impl CallbackContext {
    pub fn new(pool: impl Into<String>, max_processes: usize) -> Self {
        Self {
            pool: pool.into(),
            max_processes,
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: BTreeMap<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_range(mut self, range: ContextRange) -> Self {
        self.range = Some(range);
        self
    }
}

/// Offset/limit window repeated `nb_repeat` times, `step` apart.
///
/// Used by sources that page through a result set: each repetition covers
/// `offset + k * step .. + limit`. Capping with [`ContextRange::set_offset_max`]
/// shortens the iteration to the rows that actually exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRange {
    offset: u64,
    limit: u64,
    step: u64,
    nb_repeat: u64,
    offset_max: u64,
    nb_repeat_max: u64,
}

impl Default for ContextRange {
    fn default() -> Self {
        let mut range = Self {
            offset: 0,
            limit: 100,
            step: 300,
            nb_repeat: 5,
            offset_max: 0,
            nb_repeat_max: 0,
        };
        range.apply_offset_max(range.span_end().unwrap_or(u64::MAX));
        range
    }
}

impl ContextRange {
    pub fn new(offset: i64, limit: i64, step: i64, nb_repeat: i64) -> Result<Self, PoolError> {
        let offset = u64::try_from(offset)
            .map_err(|_| PoolError::InvalidRange("offset must be equal or greater than 0".to_string()))?;
        let limit = u64::try_from(limit)
            .map_err(|_| PoolError::InvalidRange("limit must be equal or greater than 0".to_string()))?;
        let step = u64::try_from(step)
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| PoolError::InvalidRange("step must be greater than 0".to_string()))?;
        let nb_repeat = u64::try_from(nb_repeat)
            .map_err(|_| PoolError::InvalidRange("repeat must be equal or greater than 0".to_string()))?;

        let mut range = Self {
            offset,
            limit,
            step,
            nb_repeat,
            offset_max: 0,
            nb_repeat_max: 0,
        };
        let span_end = range
            .span_end()
            .ok_or_else(|| PoolError::InvalidRange("range end overflows".to_string()))?;
        range.apply_offset_max(span_end);
        Ok(range)
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn nb_repeat(&self) -> u64 {
        self.nb_repeat
    }

    pub fn offset_max(&self) -> u64 {
        self.offset_max
    }

    /// Cap the window at the size of the underlying result set
    pub fn set_offset_max(&mut self, offset_max: i64) -> Result<&mut Self, PoolError> {
        let offset_max = u64::try_from(offset_max)
            .map_err(|_| PoolError::InvalidRange("offset max must be equal or greater than 0".to_string()))?;
        let capped = self.span_end().map_or(offset_max, |end| offset_max.min(end));
        self.apply_offset_max(capped);
        Ok(self)
    }

    /// Offsets of each repetition, in order
    pub fn offsets(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.nb_repeat_max).map(move |k| self.offset + k * self.step)
    }

    /// Last offset the full window can reach; `None` when it does not fit in a u64
    fn span_end(&self) -> Option<u64> {
        let window = self.offset.checked_add(self.limit)?;
        match self.nb_repeat {
            0 => Some(window.saturating_sub(self.step)),
            n => self.step.checked_mul(n - 1)?.checked_add(window),
        }
    }

    fn apply_offset_max(&mut self, offset_max: u64) {
        self.offset_max = offset_max;
        self.nb_repeat_max = if offset_max > 0 && offset_max >= self.offset {
            (offset_max - self.offset) / self.step + 1
        } else {
            0
        };
    }
}
