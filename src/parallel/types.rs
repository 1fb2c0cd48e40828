//! Type definitions for the parallel pipeline
//!
//! Contains pool configuration and the pipeline lifecycle state.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use crate::error::ConntopError;
use crate::source::DEFAULT_BLOCK_SIZE;

pub const DEFAULT_PARSER_POOL_SIZE: usize = 6;
pub const DEFAULT_AGGREGATOR_POOL_SIZE: usize = 2;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

// Read buffers and queues are allocated up front at their full size.
pub const MAX_BLOCK_SIZE: usize = 64 * 1024 * 1024;
pub const MAX_QUEUE_CAPACITY: usize = 1_000_000;
pub const MAX_POOL_SIZE: usize = 1024;

/// Configuration for parallel processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelConfig {
    pub block_size: usize,
    pub parser_pool_size: usize,
    pub aggregator_pool_size: usize,
    /// Capacity of each of the three inter-stage queues.
    pub queue_capacity: usize,
    /// Print the progress line this often; `None` disables it.
    pub progress_interval: Option<Duration>,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            parser_pool_size: DEFAULT_PARSER_POOL_SIZE,
            aggregator_pool_size: DEFAULT_AGGREGATOR_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            progress_interval: None,
        }
    }
}

impl ParallelConfig {
    pub fn validate(&self) -> Result<(), ConntopError> {
        let checks = [
            ("block size", self.block_size),
            ("parser pool size", self.parser_pool_size),
            ("aggregator pool size", self.aggregator_pool_size),
            ("queue capacity", self.queue_capacity),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ConntopError::config(format!("{} must be positive", name)));
            }
        }
        let limits = [
            ("block size", self.block_size, MAX_BLOCK_SIZE),
            ("parser pool size", self.parser_pool_size, MAX_POOL_SIZE),
            ("aggregator pool size", self.aggregator_pool_size, MAX_POOL_SIZE),
            ("queue capacity", self.queue_capacity, MAX_QUEUE_CAPACITY),
        ];
        for (name, value, max) in limits {
            if value > max {
                return Err(ConntopError::config(format!(
                    "{} must be at most {}, got {}",
                    name, max, value
                )));
            }
        }
        if self.progress_interval == Some(Duration::ZERO) {
            return Err(ConntopError::config("progress interval must be positive"));
        }
        Ok(())
    }
}

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Running = 1,
    /// Input is exhausted; downstream stages are finishing in-flight work.
    Draining = 2,
    Done = 3,
    Failed = 4,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PipelineState::Idle,
            1 => PipelineState::Running,
            2 => PipelineState::Draining,
            3 => PipelineState::Done,
            _ => PipelineState::Failed,
        }
    }
}

/// Shared, lock-free holder of the [`PipelineState`].
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl Default for StateCell {
    fn default() -> Self {
        Self(AtomicU8::new(PipelineState::Idle as u8))
    }
}

impl StateCell {
    pub fn get(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`; returns false if the state was not `from`.
    pub fn transition(&self, from: PipelineState, to: PipelineState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enter `Failed` from any non-terminal state.
    pub fn fail(&self) {
        let _ = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            match PipelineState::from_u8(current) {
                PipelineState::Done | PipelineState::Failed => None,
                _ => Some(PipelineState::Failed as u8),
            }
        });
    }

    pub fn is_failed(&self) -> bool {
        self.get() == PipelineState::Failed
    }
}
